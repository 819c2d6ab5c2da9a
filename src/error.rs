//! Error types returned from the Engine API's fallible entry points.
//! Everything reachable from a driver is a typed error rather than a
//! panic, except `InternalInvariantViolation`, which is treated as a
//! genuine bug: it panics in debug builds (so test suites catch it)
//! and degrades to returning any legal move in release builds rather
//! than taking the engine process down mid-game.

use thiserror::Error;

use crate::movegen::ChessMove;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("no legal moves available in the current position")]
    NoLegalMoves,

    #[error("search time exhausted before a move was chosen; falling back to {fallback_move}")]
    TimeExhausted { fallback_move: ChessMove },

    #[error("unknown engine option: '{0}'")]
    UnknownOption(String),

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),
}

impl std::fmt::Display for ChessMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_uci())
    }
}
