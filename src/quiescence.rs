//! Quiescence search: resolves tactical noise (hanging captures, check
//! sequences) at the horizon of the main search so Negamax doesn't
//! misjudge a position mid-exchange.
//! See https://www.chessprogramming.org/Quiescence_Search

use crate::config::EngineConfig;
use crate::evaluate;
use crate::movegen;
use crate::pieces;
use crate::position::Position;
use crate::stats::NodeCounters;
use crate::time_manager::{Deadline, NODE_POLL_INTERVAL};
use crate::tt::MATE;

// Margin added on top of a captured piece's value before comparing
// against alpha; a capture that can't plausibly close the gap even
// with this much slack is pruned without being searched.
const DELTA_MARGIN: i32 = 200;

// Fail-soft quiescence search. Returns the best score found, which may
// lie outside `[alpha, beta]` -- the caller clamps as needed.
pub fn quiesce(
    board: &mut Position,
    mut alpha: i32,
    beta: i32,
    ply: i32,
    config: &EngineConfig,
    counters: &NodeCounters,
    deadline: &Deadline,
) -> i32 {
    let nodes = counters.record_node();
    if nodes % NODE_POLL_INTERVAL == 0 && deadline.is_expired() {
        return alpha;
    }

    if ply >= crate::tt::MAX_PLY {
        return evaluate::static_evaluation(board);
    }

    let in_check = board.is_check();
    let mut best_score;
    let mut stand_pat = 0;

    if in_check {
        // No stand-pat when in check: every evasion must be examined,
        // since "doing nothing" isn't legal.
        best_score = -MATE + ply;
    } else {
        stand_pat = evaluate::static_evaluation(board);
        if stand_pat >= beta {
            return stand_pat;
        }
        best_score = stand_pat;
        if alpha < stand_pat {
            alpha = stand_pat;
        }
    }

    let my_color = board.side_to_move();
    let mut moves = if in_check {
        movegen::generate_evasion_moves(board, my_color)
    } else {
        movegen::generate_capture_moves(board, my_color)
    };
    movegen::retain_only_legal_moves(board, &mut moves);

    if in_check && moves.is_empty() {
        // Checkmate.
        return -MATE + ply;
    }

    crate::move_order::order_moves(
        &mut moves,
        None,
        &crate::move_order::KillerMoves::new(0),
        0,
        config.move_order,
        config.mvv_lva_weight,
        config.killer_weight,
    );

    for m in moves.iter() {
        if !in_check && config.delta {
            if let Some(captured) = m.captured_piece {
                let captured_value = pieces::PIECE_VALUES[captured];
                if stand_pat + captured_value + DELTA_MARGIN < alpha {
                    continue;
                }
            }
        }

        board.make_move(m.start_square, m.end_square, m.promotion);
        let score = -quiesce(board, -beta, -alpha, ply + 1, config, counters, deadline);
        board.unmake_move();

        if score > best_score {
            best_score = score;
        }
        if score > alpha {
            alpha = score;
        }
        if alpha >= beta {
            counters.record_cutoff();
            break;
        }
    }

    best_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_quiesce_is_fail_soft_and_stable_on_quiet_position() {
        let mut board = Position::new();
        board.new_game();
        let config = EngineConfig::default();
        let counters = NodeCounters::new();
        let deadline = Deadline::new(std::time::Duration::from_secs(5));
        let score = quiesce(&mut board, -crate::tt::INF, crate::tt::INF, 0, &config, &counters, &deadline);
        // Starting position is dead quiet; quiescence should just
        // return the static evaluation (0, material-balanced).
        assert_eq!(score, 0);
    }

    #[test]
    fn test_quiesce_finds_hanging_queen_capture() {
        let mut board = Position::new();
        board.load_fen("4k3/8/8/3q4/8/8/8/3QK3 w - - 0 1").unwrap();
        let config = EngineConfig::default();
        let counters = NodeCounters::new();
        let deadline = Deadline::new(std::time::Duration::from_secs(5));
        let score = quiesce(&mut board, -crate::tt::INF, crate::tt::INF, 0, &config, &counters, &deadline);
        assert!(score > 0);
    }
}
