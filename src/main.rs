//! Entry point for the Sporkfish UCI binary. Parses a handful of
//! startup flags with `clap`, initializes `tracing-subscriber` logging
//! (controlled via `RUST_LOG`), then hands control to the UCI loop.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sporkfish::uci::Uci;

#[derive(Parser, Debug)]
#[command(name = "sporkfish", version, about = "A UCI chess engine")]
struct Cli {
    /// Transposition table size, in log2 of slot count.
    #[arg(long, default_value_t = 20)]
    hash_log2: u32,

    /// Number of Lazy SMP worker threads. 1 disables parallel search.
    #[arg(long, default_value_t = 1)]
    threads: usize,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!(hash_log2 = cli.hash_log2, threads = cli.threads, "starting sporkfish");

    let mut config = sporkfish::config::EngineConfig::default();
    config.tt_capacity_log2 = cli.hash_log2;
    config.search_mode = if cli.threads <= 1 {
        sporkfish::config::SearchMode::PvsSingle
    } else {
        sporkfish::config::SearchMode::NegamaxSmp { workers: cli.threads }
    };

    let mut uci = Uci::with_config(config);
    uci.main_loop();
}
