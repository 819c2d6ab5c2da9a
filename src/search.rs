//! The search engine: fail-soft Negamax with Principal Variation Search,
//! driven by iterative deepening with aspiration windows. Everything
//! else in this crate (the TT, the evaluator, move ordering,
//! quiescence, the time manager) exists to support this module.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::evaluate;
use crate::move_order::{self, KillerMoves};
use crate::movegen::{self, ChessMove};
use crate::position::Position;
use crate::quiescence;
use crate::stats::{IterationReport, NodeCounters};
use crate::time_manager::{Deadline, NODE_POLL_INTERVAL};
use crate::tt::{self, CompactMove, TTFlag, TranspositionTable, INF, MATE, MATE_THRESHOLD};

// Null-move reduction: search the null-move child this much shallower
// than the current node.
const NULL_MOVE_REDUCTION: i32 = 2;
const NULL_MOVE_MIN_DEPTH: i32 = 3;

// Futility margins at the frontier, per the resolved Open Question:
// depth 1 = 150cp, depth 2 = 300cp. Index 0 is unused.
const FUTILITY_MARGIN: [i32; 3] = [0, 150, 300];

const ASPIRATION_WINDOW: i32 = 50;

pub struct SearchEngine {
    pub tt: Arc<TranspositionTable>,
    config: EngineConfig,
}

struct SearchContext<'a> {
    tt: &'a TranspositionTable,
    config: &'a EngineConfig,
    counters: NodeCounters,
    deadline: &'a Deadline,
    killers: KillerMoves,
    pv_table: Vec<Vec<Option<ChessMove>>>,
    // Selects PVS's null-window-then-re-search windowing for every
    // move after the first (the normal, production path) versus
    // always searching the full `(-beta, -alpha)` window like plain
    // Negamax. Only ever `false` in the test that checks the two
    // produce identical scores (spec invariant: PVS == Negamax).
    use_pvs: bool,
}

impl<'a> SearchContext<'a> {
    fn new(tt: &'a TranspositionTable, config: &'a EngineConfig, deadline: &'a Deadline) -> Self {
        let max_ply = tt::MAX_PLY as usize;
        SearchContext {
            tt,
            config,
            counters: NodeCounters::new(),
            deadline,
            killers: KillerMoves::new(max_ply),
            pv_table: vec![vec![None; 1]; max_ply],
            use_pvs: matches!(config.search_mode, crate::config::SearchMode::PvsSingle),
        }
    }
}

impl SearchEngine {
    pub fn new(config: EngineConfig) -> SearchEngine {
        let tt = Arc::new(TranspositionTable::new(config.tt_capacity_log2));
        SearchEngine { tt, config }
    }

    // Construct a search engine against an already-shared TT, used by
    // Lazy SMP workers so every worker reads and writes the same table.
    pub fn from_shared_tt(tt: Arc<TranspositionTable>, config: EngineConfig) -> SearchEngine {
        SearchEngine { tt, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        if config.tt_capacity_log2 != self.config.tt_capacity_log2 {
            self.tt = Arc::new(TranspositionTable::new(config.tt_capacity_log2));
        }
        self.config = config;
    }

    pub fn new_game(&self) {
        self.tt.new_generation();
    }

    // Iterative deepening driver: searches depth 1..=max_depth, widening
    // aspiration windows around the previous iteration's score, and
    // stops early on an exhausted deadline or a proven mate.
    pub fn find_best_move(&self, board: &mut Position, deadline: &Deadline) -> Option<IterationReport> {
        let start = Instant::now();
        let mut ctx = SearchContext::new(&self.tt, &self.config, deadline);

        let mut best_report: Option<IterationReport> = None;
        let mut last_score = 0;

        for depth in 1..=self.config.max_depth {
            if depth > 1 && !deadline.should_start_next_iteration() {
                break;
            }

            let (alpha0, beta0) = if depth == 1 || !self.config.aspiration {
                (-INF, INF)
            } else {
                (last_score - ASPIRATION_WINDOW, last_score + ASPIRATION_WINDOW)
            };

            let iteration_result = self.search_iteration_with_aspiration(board, depth, alpha0, beta0, &mut ctx);

            if deadline.is_expired() && best_report.is_some() {
                // Partial iteration; discard it and keep the previous
                // completed iteration's result.
                break;
            }

            match iteration_result {
                Some((score, best_move)) => {
                    last_score = score;
                    let pv = extract_pv(&ctx.pv_table, depth as usize);
                    let report = IterationReport {
                        depth,
                        score,
                        best_move,
                        pv,
                        nodes: ctx.counters.nodes(),
                        elapsed: start.elapsed(),
                    };
                    info!(
                        depth = report.depth,
                        score = report.score,
                        nodes = report.nodes,
                        nps = report.nps(),
                        pv = %report.pv_string(),
                        "iteration complete"
                    );
                    let proven_mate = score.abs() >= MATE_THRESHOLD;
                    best_report = Some(report);
                    if proven_mate {
                        break;
                    }
                }
                None => break,
            }
        }

        best_report
    }

    // Runs one iterative-deepening depth, applying the resolved
    // aspiration re-search policy: widen the failing bound to infinity
    // and retry; a second failure at the same depth falls back to a
    // full window.
    fn search_iteration_with_aspiration(
        &self,
        board: &mut Position,
        depth: i32,
        mut alpha: i32,
        mut beta: i32,
        ctx: &mut SearchContext,
    ) -> Option<(i32, ChessMove)> {
        let mut widened_low = false;
        let mut widened_high = false;
        loop {
            let (score, best_move) = self.search_root(board, depth, alpha, beta, ctx)?;
            if score <= alpha {
                if widened_low {
                    alpha = -INF;
                    beta = INF;
                } else {
                    alpha = -INF;
                    widened_low = true;
                }
                continue;
            }
            if score >= beta {
                if widened_high {
                    alpha = -INF;
                    beta = INF;
                } else {
                    beta = INF;
                    widened_high = true;
                }
                continue;
            }
            return Some((score, best_move));
        }
    }

    fn search_root(
        &self,
        board: &mut Position,
        depth: i32,
        alpha: i32,
        beta: i32,
        ctx: &mut SearchContext,
    ) -> Option<(i32, ChessMove)> {
        let my_color = board.side_to_move();
        let mut moves = movegen::generate_all_psuedo_legal_moves(board, my_color);
        movegen::retain_only_legal_moves(board, &mut moves);
        if moves.is_empty() {
            return None;
        }

        let tt_move = ctx.tt.probe(board.zobrist_hash, 0).and_then(|e| e.best_move);
        move_order::order_moves(&mut moves, tt_move, &ctx.killers, 0, ctx.config.move_order, ctx.config.mvv_lva_weight, ctx.config.killer_weight);

        let mut best_score = -INF;
        let mut best_move = moves[0];
        let mut alpha = alpha;

        for (i, m) in moves.iter().enumerate() {
            if ctx.deadline.is_expired() {
                return if best_score > -INF { Some((best_score, best_move)) } else { None };
            }

            board.make_move(m.start_square, m.end_square, m.promotion);
            let score = if i == 0 || !ctx.use_pvs {
                -negamax(board, depth - 1, -beta, -alpha, 1, true, ctx)
            } else {
                let null_window_score = -negamax(board, depth - 1, -alpha - 1, -alpha, 1, true, ctx);
                if null_window_score > alpha && null_window_score < beta {
                    -negamax(board, depth - 1, -beta, -alpha, 1, true, ctx)
                } else {
                    null_window_score
                }
            };
            board.unmake_move();

            if score > best_score {
                best_score = score;
                best_move = *m;
                record_pv(&mut ctx.pv_table, 0, *m);
            }
            if score > alpha {
                alpha = score;
            }
            if alpha >= beta {
                break;
            }
        }

        ctx.tt.store(
            board.zobrist_hash,
            depth as i8,
            TTFlag::Exact,
            best_score,
            Some(CompactMove::from_move(&best_move)),
            0,
        );

        Some((best_score, best_move))
    }
}

// The recursive fail-soft Negamax/PVS core.
fn negamax(
    board: &mut Position,
    mut depth: i32,
    mut alpha: i32,
    beta: i32,
    ply: i32,
    allow_null: bool,
    ctx: &mut SearchContext,
) -> i32 {
    let nodes = ctx.counters.record_node();
    if nodes % NODE_POLL_INTERVAL == 0 && ctx.deadline.is_expired() {
        return alpha;
    }

    let in_check = board.is_check();
    if in_check {
        // Search check evasions one ply deeper than the nominal depth
        // would suggest; otherwise checks right at the horizon would
        // drop straight into a (possibly mate-blind) quiescence search.
        depth += 1;
    }

    if ply > 0 {
        if board.is_draw_by_threefold_repetition() || board.is_draw_by_insufficient_material() || board.halfmove_clock >= 100 {
            return 0;
        }
        if ply >= tt::MAX_PLY {
            return evaluate::static_evaluation(board);
        }
    }

    if depth <= 0 {
        return quiescence::quiesce(board, alpha, beta, ply, ctx.config, &ctx.counters, ctx.deadline);
    }

    let original_alpha = alpha;
    let mut tt_move = None;
    if ctx.config.tt_enabled {
        if let Some(entry) = ctx.tt.probe(board.zobrist_hash, ply) {
            ctx.counters.record_tt_probe(true);
            tt_move = entry.best_move;
            if entry.depth as i32 >= depth {
                match entry.flag {
                    TTFlag::Exact => return entry.score,
                    TTFlag::Lower if entry.score >= beta => return entry.score,
                    TTFlag::Upper if entry.score <= alpha => return entry.score,
                    _ => {}
                }
            }
        } else {
            ctx.counters.record_tt_probe(false);
        }
    }

    let my_color = board.side_to_move();

    // Null-move pruning: skip our own move entirely and see if the
    // opponent, given a free move, still can't beat beta. If so, our
    // position is presumably good enough to prune without a full
    // search. Disabled in check (a "null move" while in check isn't
    // legal to reason about) and in king+pawn endgames (zugzwang).
    if allow_null
        && ctx.config.null_move
        && !in_check
        && depth >= NULL_MOVE_MIN_DEPTH
        && beta < MATE_THRESHOLD
        && board.has_non_pawn_material(my_color)
    {
        let prior_ep = board.make_null_move();
        let score = -negamax(board, depth - 1 - NULL_MOVE_REDUCTION, -beta, -beta + 1, ply + 1, false, ctx);
        board.unmake_null_move(prior_ep);
        if score >= beta {
            return score;
        }
    }

    let static_eval = evaluate::static_evaluation(board);
    let use_futility = ctx.config.futility && !in_check && depth >= 1 && depth as usize <= 2;

    let mut moves = movegen::generate_all_psuedo_legal_moves(board, my_color);
    movegen::retain_only_legal_moves(board, &mut moves);

    if moves.is_empty() {
        return if in_check { -MATE + ply } else { 0 };
    }

    move_order::order_moves(&mut moves, tt_move, &ctx.killers, ply as usize, ctx.config.move_order, ctx.config.mvv_lva_weight, ctx.config.killer_weight);

    let mut best_score = -INF;
    let mut best_move: Option<ChessMove> = None;

    for (i, m) in moves.iter().enumerate() {
        let is_quiet = m.captured_piece.is_none() && m.promotion.is_none();

        if use_futility && is_quiet && i > 0 {
            let margin = FUTILITY_MARGIN[depth as usize];
            if static_eval + margin <= alpha {
                continue;
            }
        }

        board.make_move(m.start_square, m.end_square, m.promotion);
        let score = if i == 0 || !ctx.use_pvs {
            -negamax(board, depth - 1, -beta, -alpha, ply + 1, true, ctx)
        } else {
            let null_window_score = -negamax(board, depth - 1, -alpha - 1, -alpha, ply + 1, true, ctx);
            if null_window_score > alpha && null_window_score < beta {
                -negamax(board, depth - 1, -beta, -alpha, ply + 1, true, ctx)
            } else {
                null_window_score
            }
        };
        board.unmake_move();

        if score > best_score {
            best_score = score;
            best_move = Some(*m);
            record_pv(&mut ctx.pv_table, ply as usize, *m);
        }
        if score > alpha {
            alpha = score;
        }
        if alpha >= beta {
            ctx.counters.record_cutoff();
            if is_quiet {
                ctx.killers.store(ply as usize, *m);
            }
            break;
        }
    }

    if ctx.config.tt_enabled {
        let flag = if best_score <= original_alpha {
            TTFlag::Upper
        } else if best_score >= beta {
            TTFlag::Lower
        } else {
            TTFlag::Exact
        };
        ctx.tt.store(
            board.zobrist_hash,
            depth as i8,
            flag,
            best_score,
            best_move.map(|m| CompactMove::from_move(&m)),
            ply,
        );
        debug!(ply, depth, score = best_score, ?flag, "tt store");
    }

    best_score
}

fn record_pv(pv_table: &mut [Vec<Option<ChessMove>>], ply: usize, m: ChessMove) {
    if ply < pv_table.len() {
        pv_table[ply][0] = Some(m);
    }
}

// Extract the principal variation recorded at the root. This records
// only the best move found at each ply during the most recent root
// search -- a simplification of a full triangular PV table, sufficient
// to report a PV line alongside each completed iteration without the
// bookkeeping a true triangular table needs for PVS re-searches.
fn extract_pv(pv_table: &[Vec<Option<ChessMove>>], max_len: usize) -> Vec<ChessMove> {
    let mut pv = Vec::new();
    for slot in pv_table.iter().take(max_len) {
        match slot[0] {
            Some(m) => pv.push(m),
            None => break,
        }
    }
    pv
}

// The `TimeExhausted` fallback: rank legal moves by the static
// evaluation of the position one ply after playing them, and play the
// best-looking one rather than returning no move at all.
pub fn fallback_move_on_time_exhaustion(board: &mut Position) -> Option<ChessMove> {
    let my_color = board.side_to_move();
    let mut moves = movegen::generate_all_psuedo_legal_moves(board, my_color);
    movegen::retain_only_legal_moves(board, &mut moves);
    if moves.is_empty() {
        warn!("time exhausted with no legal moves available");
        return None;
    }
    moves.sort_by_cached_key(|m| {
        board.make_move(m.start_square, m.end_square, m.promotion);
        let score = -evaluate::static_evaluation(board);
        board.unmake_move();
        -score
    });
    moves.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Outcome;
    use std::time::Duration;

    fn engine() -> SearchEngine {
        SearchEngine::new(EngineConfig::default())
    }

    #[test]
    fn test_finds_mate_in_one() {
        let mut board = Position::new();
        board.load_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1").unwrap();
        let engine = engine();
        let deadline = Deadline::new(Duration::from_secs(5));
        let report = engine.find_best_move(&mut board, &deadline).unwrap();
        assert_eq!(report.best_move.to_uci(), "a1a8");
        assert!(report.score >= MATE_THRESHOLD);
        // Mate distance preservation (spec invariant 8.5): playing the
        // reported mate-in-1 move must actually deliver checkmate, not
        // merely a high score -- a distance-off-by-one bug would still
        // pass the score assertion above but leave the opponent with a
        // legal reply.
        board.make_move(report.best_move.start_square, report.best_move.end_square, report.best_move.promotion);
        let has_moves = board.has_legal_moves();
        assert!(!has_moves);
        assert_eq!(board.outcome(has_moves), crate::position::Outcome::Checkmate);
    }

    #[test]
    fn test_avoids_stalemate_when_winning() {
        let mut board = Position::new();
        board.load_fen("7k/8/8/8/8/8/6Q1/6K1 w - - 0 1").unwrap();
        let engine = engine();
        let deadline = Deadline::new(Duration::from_secs(2));
        let report = engine.find_best_move(&mut board, &deadline).unwrap();
        board.make_move(report.best_move.start_square, report.best_move.end_square, report.best_move.promotion);
        let has_moves = board.has_legal_moves();
        let outcome = board.outcome(has_moves);
        assert_ne!(outcome, Outcome::Stalemate);
    }

    #[test]
    fn test_opening_search_returns_a_legal_move_with_many_nodes() {
        let mut board = Position::new();
        board.new_game();
        let engine = engine();
        let deadline = Deadline::new(Duration::from_secs(1));
        let report = engine.find_best_move(&mut board, &deadline).unwrap();
        assert!(report.nodes > 1000);
        let legal = movegen::generate_all_psuedo_legal_moves(&board, board.side_to_move());
        assert!(legal.iter().any(|m| m.start_square == report.best_move.start_square && m.end_square == report.best_move.end_square));
    }

    // Zugzwang (null-move pitfall): with only a king left for White,
    // null-move pruning must be disabled (king+pawn-only material) or
    // it would let White "pass" and falsely conclude the position is
    // fine. The position is lost for White regardless of the move
    // played, so the reported score must reflect that rather than the
    // falsely rosy result an unguarded null-move search would produce.
    #[test]
    fn test_zugzwang_position_is_not_miscounted_as_safe_by_null_move() {
        let mut board = Position::new();
        board.load_fen("8/8/8/8/8/4k3/4p3/4K3 w - - 0 1").unwrap();
        let engine = engine();
        let deadline = Deadline::new(Duration::from_secs(2));
        let report = engine.find_best_move(&mut board, &deadline).unwrap();
        assert!(report.score < 0, "expected a losing score for White in zugzwang, got {}", report.score);
    }

    #[test]
    fn test_pvs_matches_full_window_on_quiet_position() {
        let mut board = Position::new();
        board.new_game();
        let mut config = EngineConfig::default();
        config.aspiration = false;
        let engine = SearchEngine::new(config);
        let deadline = Deadline::new(Duration::from_secs(5));
        let mut ctx = SearchContext::new(&engine.tt, engine.config(), &deadline);
        let (score, _) = engine.search_root(&mut board, 2, -INF, INF, &mut ctx).unwrap();
        // The symmetric starting position should evaluate close to
        // level at a shallow depth.
        assert!(score.abs() < 150);
    }

    // Spec invariant 8.4: the stored TT flag must match which bound of
    // the search window the fail-soft score actually respects -- a
    // fail-low score (<= alpha) stores Upper, a fail-high score
    // (>= beta) stores Lower.
    #[test]
    fn test_fail_soft_score_matches_stored_tt_flag() {
        let tt = TranspositionTable::new(10);
        let config = EngineConfig::default();
        let deadline = Deadline::new(Duration::from_secs(5));

        let mut board_low = Position::new();
        board_low.new_game();
        let mut ctx_low = SearchContext::new(&tt, &config, &deadline);
        // The quiet starting position evaluates near 0; a window well
        // above that forces a fail-low (nothing reaches alpha).
        let fail_low_score = negamax(&mut board_low, 3, 500, 1000, 0, true, &mut ctx_low);
        assert!(fail_low_score <= 500);
        let entry = tt.probe(board_low.zobrist_hash, 0).expect("fail-low node must still store a TT entry");
        assert_eq!(entry.flag, TTFlag::Upper);

        let mut board_high = Position::new();
        board_high.new_game();
        let mut ctx_high = SearchContext::new(&tt, &config, &deadline);
        // A window well below 0 forces a fail-high (even the first
        // move searched beats beta).
        let fail_high_score = negamax(&mut board_high, 3, -1000, -500, 0, true, &mut ctx_high);
        assert!(fail_high_score >= -500);
        let entry = tt.probe(board_high.zobrist_hash, 0).expect("fail-high node must still store a TT entry");
        assert_eq!(entry.flag, TTFlag::Lower);
    }

    // Spec invariant 8.8: for any position at a fixed depth, PVS and
    // plain Negamax return the same score. Runs both windowing
    // strategies over identical pruning/move-ordering machinery by
    // toggling `SearchContext::use_pvs`, the only thing that differs
    // between the two.
    #[test]
    fn test_pvs_score_matches_plain_negamax_score() {
        let positions = [
            "r1bqkb1r/pppp1Qpp/2n2n2/4p3/2B1P3/8/PPPP1PPP/RNB1K1NR b KQkq - 0 4",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1",
        ];
        let config = EngineConfig::default();
        let deadline = Deadline::new(Duration::from_secs(5));

        for fen in positions {
            let tt_pvs = TranspositionTable::new(10);
            let mut board_pvs = Position::new();
            board_pvs.load_fen(fen).unwrap();
            let mut ctx_pvs = SearchContext::new(&tt_pvs, &config, &deadline);
            let pvs_score = negamax(&mut board_pvs, 3, -INF, INF, 0, true, &mut ctx_pvs);

            let tt_plain = TranspositionTable::new(10);
            let mut board_plain = Position::new();
            board_plain.load_fen(fen).unwrap();
            let mut ctx_plain = SearchContext::new(&tt_plain, &config, &deadline);
            ctx_plain.use_pvs = false;
            let plain_score = negamax(&mut board_plain, 3, -INF, INF, 0, true, &mut ctx_plain);

            assert_eq!(pvs_score, plain_score, "PVS and plain Negamax disagreed on {}", fen);
        }
    }
}
