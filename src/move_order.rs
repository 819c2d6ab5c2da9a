//! Move ordering: ranks a pseudo-legal move list so alpha-beta sees the
//! most promising moves first, maximizing cutoffs.
//! See https://www.chessprogramming.org/Move_Ordering

use crate::config::MoveOrderMode;
use crate::movegen::ChessMove;
use crate::pieces;
use crate::tt::CompactMove;

// Bonus applied to the move matching the TT's remembered best move,
// high enough to always sort first.
const TT_MOVE_BONUS: i32 = 1_000_000;

#[derive(Clone)]
pub struct KillerMoves {
    // Two killer slots per ply; slot 0 is the most recently stored.
    slots: Vec<[Option<ChessMove>; 2]>,
}

impl KillerMoves {
    pub fn new(max_ply: usize) -> KillerMoves {
        KillerMoves {
            slots: vec![[None, None]; max_ply],
        }
    }

    pub fn store(&mut self, ply: usize, killer: ChessMove) {
        if ply >= self.slots.len() {
            return;
        }
        if self.slots[ply][0].map(|m| moves_equal(&m, &killer)).unwrap_or(false) {
            return;
        }
        self.slots[ply][1] = self.slots[ply][0];
        self.slots[ply][0] = Some(killer);
    }

    fn bonus(&self, ply: usize, killer_weight: i32, m: &ChessMove) -> i32 {
        if ply >= self.slots.len() {
            return 0;
        }
        if self.slots[ply][0].map(|k| moves_equal(&k, m)).unwrap_or(false) {
            return 2 * killer_weight;
        }
        if self.slots[ply][1].map(|k| moves_equal(&k, m)).unwrap_or(false) {
            return killer_weight;
        }
        0
    }
}

fn moves_equal(a: &ChessMove, b: &ChessMove) -> bool {
    a.start_square == b.start_square && a.end_square == b.end_square && a.promotion == b.promotion
}

// MVV-LVA: most valuable victim, least valuable attacker. Only
// meaningful for captures; quiets score 0 here.
fn mvv_lva_score(m: &ChessMove) -> i32 {
    match m.captured_piece {
        Some(victim) => pieces::MVV_LVA[victim][m.piece],
        None => 0,
    }
}

// Sort `moves` in place, highest priority first. `tt_move`, if present,
// is recognized by square/promotion match against the compact encoding
// stored in the transposition table.
pub fn order_moves(
    moves: &mut [ChessMove],
    tt_move: Option<CompactMove>,
    killers: &KillerMoves,
    ply: usize,
    mode: MoveOrderMode,
    mvv_lva_weight: i32,
    killer_weight: i32,
) {
    for m in moves.iter_mut() {
        let mut priority = 0;
        if let Some(tt) = tt_move {
            if tt.matches(m) {
                priority += TT_MOVE_BONUS;
            }
        }
        match mode {
            MoveOrderMode::MvvLvaOnly => {
                priority += mvv_lva_score(m) * mvv_lva_weight;
            }
            MoveOrderMode::KillersOnly => {
                priority += killers.bonus(ply, killer_weight, m);
            }
            MoveOrderMode::Composite => {
                priority += mvv_lva_score(m) * mvv_lva_weight;
                priority += killers.bonus(ply, killer_weight, m);
            }
        }
        if m.promotion == Some(pieces::QUEEN) {
            priority += 500;
        }
        m.priority = priority;
    }
    moves.sort_unstable_by(|a, b| b.priority.cmp(&a.priority));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(start: usize, end: usize) -> ChessMove {
        ChessMove { start_square: start, end_square: end, piece: pieces::KNIGHT, captured_piece: None, priority: 0, is_en_passant: false, promotion: None }
    }

    fn capture(start: usize, end: usize, victim: usize, attacker: usize) -> ChessMove {
        ChessMove { start_square: start, end_square: end, piece: attacker, captured_piece: Some(victim), priority: 0, is_en_passant: false, promotion: None }
    }

    #[test]
    fn test_tt_move_sorts_first() {
        let mut moves = vec![quiet(0, 1), quiet(2, 3)];
        let tt_move = Some(CompactMove::from_move(&quiet(2, 3)));
        let killers = KillerMoves::new(64);
        order_moves(&mut moves, tt_move, &killers, 0, MoveOrderMode::Composite, 1, 1);
        assert_eq!((moves[0].start_square, moves[0].end_square), (2, 3));
    }

    #[test]
    fn test_capture_outranks_quiet() {
        let mut moves = vec![quiet(0, 1), capture(2, 3, pieces::QUEEN, pieces::PAWN)];
        let killers = KillerMoves::new(64);
        order_moves(&mut moves, None, &killers, 0, MoveOrderMode::MvvLvaOnly, 1, 1);
        assert!(moves[0].captured_piece.is_some());
    }

    #[test]
    fn test_killer_outranks_other_quiets() {
        let mut moves = vec![quiet(0, 1), quiet(4, 5)];
        let mut killers = KillerMoves::new(64);
        killers.store(0, quiet(4, 5));
        order_moves(&mut moves, None, &killers, 0, MoveOrderMode::KillersOnly, 1, 1);
        assert_eq!((moves[0].start_square, moves[0].end_square), (4, 5));
    }
}
