//! Search statistics: node counts, cutoffs, TT hits, and the principal
//! variation, collected during one search and reported to both the
//! logging layer and the UCI `info` line from the same source of truth.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::movegen::ChessMove;

// Thread-local (per-worker) counters, cheap to increment during search.
// Merged across Lazy SMP workers into a `SearchStatistics` snapshot
// once a search completes.
#[derive(Default)]
pub struct NodeCounters {
    pub nodes: AtomicU64,
    pub beta_cutoffs: AtomicU64,
    pub tt_hits: AtomicU64,
    pub tt_probes: AtomicU64,
}

impl NodeCounters {
    pub fn new() -> NodeCounters {
        NodeCounters::default()
    }

    pub fn record_node(&self) -> u64 {
        self.nodes.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_cutoff(&self) {
        self.beta_cutoffs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tt_probe(&self, hit: bool) {
        self.tt_probes.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.tt_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn nodes(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }
}

// A snapshot published once per completed iterative-deepening
// iteration: what `engine_search` returns and what both the `tracing`
// sink and the UCI `info` line render.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub depth: i32,
    pub score: i32,
    pub best_move: ChessMove,
    pub pv: Vec<ChessMove>,
    pub nodes: u64,
    pub elapsed: Duration,
}

impl IterationReport {
    // Render the principal variation as space-separated long algebraic
    // moves, the way a UCI `info pv ...` line expects.
    pub fn pv_string(&self) -> String {
        self.pv.iter().map(|m| m.to_uci()).collect::<Vec<_>>().join(" ")
    }

    pub fn nps(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.nodes as f64 / secs) as u64
        } else {
            0
        }
    }
}
