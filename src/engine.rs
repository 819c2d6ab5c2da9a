//! The Engine Driver <-> Core API: the small set of entry points a UCI
//! loop, a Lichess bot adapter, or a test harness uses to drive a
//! search. Everything above this module (move generation, search,
//! evaluation) is an implementation detail from a driver's point of
//! view.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::config::{EngineConfig, SearchMode};
use crate::error::EngineError;
use crate::movegen::{self, ChessMove};
use crate::position::Position;
use crate::search::{self, SearchEngine};
use crate::stats::IterationReport;
use crate::time_manager::{self, Clock, Deadline};

pub struct EngineHandle {
    position: Position,
    engine: SearchEngine,
    stop_requested: Arc<AtomicBool>,
}

#[derive(Debug, Clone)]
pub struct SearchReport {
    pub best_move: ChessMove,
    pub score: i32,
    pub pv: Vec<ChessMove>,
    pub nodes: u64,
    pub depth: i32,
}

impl From<IterationReport> for SearchReport {
    fn from(r: IterationReport) -> Self {
        SearchReport {
            best_move: r.best_move,
            score: r.score,
            pv: r.pv,
            nodes: r.nodes,
            depth: r.depth,
        }
    }
}

// Create a new engine handle from a typed configuration, starting at
// the standard opening position.
pub fn engine_init(config: EngineConfig) -> EngineHandle {
    let mut position = Position::new();
    position.new_game();
    EngineHandle {
        position,
        engine: SearchEngine::new(config),
        stop_requested: Arc::new(AtomicBool::new(false)),
    }
}

// Replace the handle's position with the given FEN, then replay
// `moves` (long algebraic, e.g. "e2e4 e7e5") against it.
pub fn engine_set_position(handle: &mut EngineHandle, fen: &str, moves: &[&str]) -> Result<(), EngineError> {
    handle.position.load_fen(fen).map_err(EngineError::InvalidPosition)?;
    for m in moves {
        let parsed = movegen::convert_moves_str_into_list(m);
        for (start, end, promotion) in parsed {
            handle.position.make_move(start, end, promotion);
        }
    }
    Ok(())
}

// Reset to a fresh game: clears the TT generation so old entries lose
// priority, and resets the board to the standard starting position.
pub fn engine_new_game(handle: &mut EngineHandle) {
    handle.engine.new_game();
    handle.position = Position::new();
    handle.position.new_game();
}

// Request that an in-flight search stop as soon as it next polls the
// deadline. A no-op if no search is running.
pub fn engine_stop(handle: &EngineHandle) {
    handle.stop_requested.store(true, Ordering::Relaxed);
}

// Search the handle's current position under the given clock state,
// returning the best move found. Falls back to a statically-ranked
// legal move (logged as a warning, per the `TimeExhausted` contract)
// if the deadline expires before any iteration completes.
pub fn engine_search(handle: &mut EngineHandle, clock: Clock) -> Result<SearchReport, EngineError> {
    handle.stop_requested.store(false, Ordering::Relaxed);

    let config = handle.engine.config();
    let budget = time_manager::compute_budget(clock, config.time_weight, config.increment_weight);
    let deadline = Deadline::new(budget);

    let stop_flag = Arc::clone(&handle.stop_requested);
    // A single poll up front covers the (rare) case where `engine_stop`
    // was already called before this search started.
    if stop_flag.load(Ordering::Relaxed) {
        deadline.force_stop();
    }

    let report = match handle.engine.config().search_mode {
        SearchMode::NegamaxSingle | SearchMode::PvsSingle => handle.engine.find_best_move(&mut handle.position, &deadline),
        SearchMode::NegamaxSmp { workers } => crate::smp::search_parallel(
            Arc::clone(&handle.engine.tt),
            handle.engine.config(),
            &handle.position,
            &deadline,
            workers,
        ),
    };

    match report {
        Some(r) => Ok(r.into()),
        None => {
            let fallback = search::fallback_move_on_time_exhaustion(&mut handle.position);
            match fallback {
                Some(m) => {
                    warn!(fallback_move = %m.to_uci(), "search produced no completed iteration; falling back to static ranking");
                    Err(EngineError::TimeExhausted { fallback_move: m })
                }
                None => Err(EngineError::NoLegalMoves),
            }
        }
    }
}

pub fn engine_set_config(handle: &mut EngineHandle, config: EngineConfig) {
    handle.engine.set_config(config);
}

// Read back the handle's current configuration, e.g. so a UCI
// `setoption` can be applied as a delta against whatever was set by
// prior `setoption` commands rather than against the defaults.
pub fn engine_config(handle: &EngineHandle) -> EngineConfig {
    handle.engine.config().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_engine_search_from_starting_position() {
        let mut handle = engine_init(EngineConfig::default());
        let clock = Clock::new(Duration::from_millis(300), Duration::from_millis(0));
        let report = engine_search(&mut handle, clock).unwrap();
        assert!(report.depth >= 1);
    }

    // Spec invariant 8.7: measured wall time of `engine_search` must
    // not exceed `budget + slack(50ms)`.
    #[test]
    fn test_deadline_is_honored_within_slack() {
        let mut handle = engine_init(EngineConfig::default());
        let clock = Clock::new(Duration::from_millis(200), Duration::from_millis(0));
        let expected_budget = time_manager::compute_budget(clock, handle.engine.config().time_weight, handle.engine.config().increment_weight);

        let start = std::time::Instant::now();
        let _ = engine_search(&mut handle, clock);
        let elapsed = start.elapsed();

        assert!(
            elapsed <= expected_budget + Duration::from_millis(50),
            "search ran for {:?}, exceeding budget {:?} plus slack",
            elapsed,
            expected_budget
        );
    }

    #[test]
    fn test_engine_set_position_replays_moves() {
        let mut handle = engine_init(EngineConfig::default());
        engine_set_position(
            &mut handle,
            crate::position::STARTING_POSITION_FEN,
            &["e2e4", "e7e5"],
        )
        .unwrap();
        assert!(handle.position.whites_turn);
        assert_eq!(handle.position.piece_at(28), Some(crate::pieces::PAWN));
    }

    #[test]
    fn test_unknown_option_surface_from_config_layer() {
        let mut config = EngineConfig::default();
        assert!(config.apply_uci_option("not-a-real-option", "1").is_err());
    }
}
