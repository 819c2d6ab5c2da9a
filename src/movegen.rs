//! This module contains functions related to piece movement and
//! move legality checking.

use crate::bitboard;
use crate::pieces;
use crate::position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChessMove {

    // Starting square of the piece being moved
    pub start_square: usize,

    // Ending square of the piece being moved
    pub end_square: usize,

    // Piece type of the piece being moved
    pub piece: usize,

    // Captured piece, or None if no capture made
    pub captured_piece: Option<usize>,

    // Priority of the move, only relavant for search
    pub priority: i32,

    // Whether or not this is an en passant capture
    pub is_en_passant: bool,

    // The piece a pawn promotes to, or None if this isn't a promotion.
    pub promotion: Option<usize>,
}

impl ChessMove {
    // Render this move in UCI long algebraic notation, e.g. "e2e4" or
    // "e7e8q" for a promotion.
    pub fn to_uci(&self) -> String {
        let mut s = format!(
            "{}{}",
            position::square_to_algebraic(self.start_square),
            position::square_to_algebraic(self.end_square)
        );
        if let Some(p) = self.promotion {
            s.push(promotion_piece_to_char(p));
        }
        s
    }
}

fn promotion_piece_to_char(piece: usize) -> char {
    match piece {
        pieces::KNIGHT => 'n',
        pieces::BISHOP => 'b',
        pieces::ROOK => 'r',
        pieces::QUEEN => 'q',
        _ => 'q',
    }
}

fn promotion_char_to_piece(c: char) -> Option<usize> {
    match c {
        'n' => Some(pieces::KNIGHT),
        'b' => Some(pieces::BISHOP),
        'r' => Some(pieces::ROOK),
        'q' => Some(pieces::QUEEN),
        _ => None,
    }
}

// Converts a standard square position string into a square ID.
// For instance, "a3" -> 3
fn convert_square_str_into_id(move_str: &str) -> usize {
    let file = if let Some(e) = move_str.chars().next() {e} else {panic!("Invalid move string - file")};
    let file = if let Some(e) = "abcdefgh".find(file) {e as usize} else {panic!("Invalid move string - file")};
    let rank = if let Some(e) = move_str.chars().nth(1) {e} else {panic!("Invalid move string - rank")};
    let rank = if let Some(e) = rank.to_digit(10) {(e-1) as usize} else {panic!("Invalid move string - rank")};
    rank * 8 + file
}

// Converts a UCI-style move list (long algebraic notation without
// piece names, e.g. "e2e4" or "e7e8q") into a vector of
// (start square, end square, promotion) tuples.
pub fn convert_moves_str_into_list(move_str: &str) -> Vec<(usize, usize, Option<usize>)> {
    let mut moves = Vec::new();
    for m in move_str.split_whitespace() {
        let start_square = convert_square_str_into_id(&m[0..2]);
        let end_square = convert_square_str_into_id(&m[2..4]);
        let promotion = m.chars().nth(4).and_then(promotion_char_to_piece);
        moves.push((start_square, end_square, promotion));
    }
    moves
}

// Get any pawn push moves for a color from a starting location.
fn get_pawn_push_targets_bb(color: usize, empty: u64, square: usize) -> u64 {
    let pawn_bb = bitboard::to_bb(square);
    let single_push_bb = if color == pieces::COLOR_WHITE {bitboard::north_one(pawn_bb) & empty} else {bitboard::south_one(pawn_bb) & empty};
    let double_push_bb = if color == pieces::COLOR_WHITE {bitboard::north_one(single_push_bb) & empty & bitboard::BB_4RANK} else {bitboard::south_one(single_push_bb) & empty & bitboard::BB_5RANK};
    single_push_bb | double_push_bb
}

// Get any king target square related to castling. A castle is only
// offered when the king is not currently in check and does not pass
// through an attacked square -- the "through check" rule, which a bare
// occupancy check on `*_BETWEEN` doesn't enforce by itself (landing
// "into check" is still caught afterwards by `retain_only_legal_moves`).
fn get_castling_king_targets_bb(board: &position::Position, color: usize, occ: u64) -> u64 {
    let opp_color = 1 - color;
    if is_square_attacked_by_side(board, if color == pieces::COLOR_WHITE { 4 } else { 60 }, opp_color) {
        return 0;
    }

    let mut king_castling_bb: u64 = 0;
    if color == pieces::COLOR_WHITE {
        // Ensure we have appropriate castling rights, there are no
        // pieces between the king and rook, and the king doesn't cross
        // an attacked square en route (f1 for kingside, d1 for queenside).
        if board.white_ks_castling_rights
            && bitboard::BB_WKS_BETWEEN & occ == 0
            && !is_square_attacked_by_side(board, 5, opp_color)
        {
            king_castling_bb |= bitboard::BB_WKS_KING_END;
        }
        if board.white_qs_castling_rights
            && bitboard::BB_WQS_BETWEEN & occ == 0
            && !is_square_attacked_by_side(board, 3, opp_color)
        {
            king_castling_bb |= bitboard::BB_WQS_KING_END;
        }
    } else {
        // Same, for black (f8 / d8 are the squares the king crosses).
        if board.black_ks_castling_rights
            && bitboard::BB_BKS_BETWEEN & occ == 0
            && !is_square_attacked_by_side(board, 61, opp_color)
        {
            king_castling_bb |= bitboard::BB_BKS_KING_END;
        }
        if board.black_qs_castling_rights
            && bitboard::BB_BQS_BETWEEN & occ == 0
            && !is_square_attacked_by_side(board, 59, opp_color)
        {
            king_castling_bb |= bitboard::BB_BQS_KING_END;
        }
    }
    king_castling_bb
}

// Get all diagonal attacks (bottom left to top right) from a starting
// location.
pub fn get_diagonal_attacks_bb(occ: u64, square: usize) -> u64 {
    let tmp_occ = (bitboard::BB_DIAGONAL_MASK[square] & occ).wrapping_mul(bitboard::BB_FILES[0]).wrapping_shr(56);
    let first_rank_bb = bitboard::BB_FIRST_RANK_ATTACKS[square & 7][tmp_occ as usize] as u64;
    bitboard::BB_DIAGONAL_MASK[square] & bitboard::BB_FILES[0].wrapping_mul(first_rank_bb)
}

// Get all anti-diagonal attacks (top left to bottom right) from a starting
// location.
pub fn get_antidiagonal_attacks_bb(occ: u64, square: usize) -> u64 {
    let tmp_occ = (bitboard::BB_ANTIDIAGONAL_MASK[square] & occ).wrapping_mul(bitboard::BB_FILES[0]).wrapping_shr(56);
    let first_rank_bb = bitboard::BB_FIRST_RANK_ATTACKS[square & 7][tmp_occ as usize] as u64;
    bitboard::BB_ANTIDIAGONAL_MASK[square] & bitboard::BB_FILES[0].wrapping_mul(first_rank_bb)
}

// Get all rank attacks from a starting location
pub fn get_rank_attacks_bb(occ: u64, square: usize) -> u64 {
    let tmp_occ = (bitboard::BB_RANK_MASK[square] & occ).wrapping_mul(bitboard::BB_FILES[0]).wrapping_shr(56);
    let first_rank_bb = bitboard::BB_FIRST_RANK_ATTACKS[square & 7][tmp_occ as usize] as u64;
    bitboard::BB_RANK_MASK[square] & bitboard::BB_FILES[0].wrapping_mul(first_rank_bb)
}

// Get all file attacks from a starting location
pub fn get_file_attacks_bb(occ: u64, square: usize) -> u64 {
    let tmp_square = square & 7;
    let mut tmp_occ = bitboard::BB_FILES[0] & occ.wrapping_shr(tmp_square as u32);
    tmp_occ = bitboard::BB_MAIN_DIAGONAL.wrapping_mul(tmp_occ).wrapping_shr(56);
    let index = (square ^ 56).wrapping_shr(3);
    let first_rank_bb = bitboard::BB_FIRST_RANK_ATTACKS[index][tmp_occ as usize] as u64;
    tmp_occ = bitboard::BB_MAIN_DIAGONAL.wrapping_mul(first_rank_bb);
    (bitboard::BB_FILES[7] & tmp_occ).wrapping_shr((tmp_square ^ 7) as u32)
}

// Determine the opponent's piece that is being captured
fn get_opponents_captured_piece(opp_bbs: &[u64], capture_square: usize, is_en_passant: bool) -> usize {
    if is_en_passant {
        return pieces::PAWN;
    }
    let capture_bb = bitboard::to_bb(capture_square);
    for (opp_piece, opp_bb) in opp_bbs.iter().enumerate() {
        if opp_bb & capture_bb != 0 {
            return opp_piece;
        }
    }
    panic!("Invalid bitboard; cannot find opponents captured piece");
}

const PROMOTION_PIECES: [usize; 4] = [pieces::QUEEN, pieces::ROOK, pieces::BISHOP, pieces::KNIGHT];

fn is_promotion_square(color: usize, end_square: usize) -> bool {
    let end_rank = end_square / 8;
    (color == pieces::COLOR_WHITE && end_rank == 7) || (color == pieces::COLOR_BLACK && end_rank == 0)
}

// Push either one move (non-promotion) or one move per promotion piece
// choice into the destination vector.
fn push_pawn_move(
    moves: &mut Vec<ChessMove>,
    color: usize,
    start_square: usize,
    end_square: usize,
    captured_piece: Option<usize>,
    is_en_passant: bool,
) {
    if is_promotion_square(color, end_square) {
        for &p in PROMOTION_PIECES.iter() {
            moves.push(ChessMove {
                start_square,
                end_square,
                piece: pieces::PAWN,
                captured_piece,
                priority: 0,
                is_en_passant,
                promotion: Some(p),
            });
        }
    } else {
        moves.push(ChessMove {
            start_square,
            end_square,
            piece: pieces::PAWN,
            captured_piece,
            priority: 0,
            is_en_passant,
            promotion: None,
        });
    }
}

// Generate all psuedo-legal moves for a given color.
// A psuedo-legal move is an otherwise legal move that has not yet been
// checked to determine if it leaves the player's king in check.
pub fn generate_all_psuedo_legal_moves(board: &position::Position, my_color: usize) -> Vec<ChessMove> {
    generate_moves(board, my_color, false)
}

// Generate only capturing (and promoting) psuedo-legal moves; used by
// quiescence search.
pub fn generate_capture_moves(board: &position::Position, my_color: usize) -> Vec<ChessMove> {
    generate_moves(board, my_color, true)
}

fn generate_moves(board: &position::Position, my_color: usize, captures_only: bool) -> Vec<ChessMove> {

    let mut capture_moves = Vec::new();
    let mut quiet_moves = Vec::new();

    // Get colors
    let opp_color = 1 - my_color;

    // Create the en passant bitboard, which will be 0 if no en passant
    // rights exist
    let mut en_passant_bb = 0;
    if let Some(e) = board.en_passant_rights {
        en_passant_bb = bitboard::to_bb(e);
    }

    // Loop through each of our bitboards to generate a set of pseudo-legal moves
    for (piece, bb) in board.bb_pieces[my_color].iter().enumerate() {
        for square in bitboard::occupied_squares(*bb) {

            // Store state regarding an en passant capture
            let mut is_en_passant = false;

            // Get quite (i.e., non-capture) and capture move bitboards for the piece
            let quite_move_bb;
            let capture_move_bb;
            if piece == pieces::PAWN {
                quite_move_bb = get_pawn_push_targets_bb(my_color, board.bb_empty_squares, square);
                if bitboard::BB_PAWN_ATTACKS[my_color][square] & en_passant_bb != 0 {
                    is_en_passant = true;
                }
                capture_move_bb = bitboard::BB_PAWN_ATTACKS[my_color][square] & (board.bb_side[opp_color] | en_passant_bb);
            } else if piece == pieces::KNIGHT {
                quite_move_bb = bitboard::BB_KNIGHT_ATTACKS[square] & board.bb_empty_squares;
                capture_move_bb = bitboard::BB_KNIGHT_ATTACKS[square] & board.bb_side[opp_color];
            } else if piece == pieces::BISHOP {
                let bishop_attacks = get_diagonal_attacks_bb(board.bb_occupied_squares, square) | get_antidiagonal_attacks_bb(board.bb_occupied_squares, square);
                quite_move_bb = bishop_attacks & board.bb_empty_squares;
                capture_move_bb = bishop_attacks & board.bb_side[opp_color];
            } else if piece == pieces::ROOK {
                let rook_attacks = get_rank_attacks_bb(board.bb_occupied_squares, square) | get_file_attacks_bb(board.bb_occupied_squares, square);
                quite_move_bb = rook_attacks & board.bb_empty_squares;
                capture_move_bb = rook_attacks & board.bb_side[opp_color];
            } else if piece == pieces::QUEEN {
                let bishop_attacks = get_diagonal_attacks_bb(board.bb_occupied_squares, square) | get_antidiagonal_attacks_bb(board.bb_occupied_squares, square);
                let rook_attacks = get_rank_attacks_bb(board.bb_occupied_squares, square) | get_file_attacks_bb(board.bb_occupied_squares, square);
                let queen_attacks = bishop_attacks | rook_attacks;
                quite_move_bb = queen_attacks & board.bb_empty_squares;
                capture_move_bb = queen_attacks & board.bb_side[opp_color];
            } else if piece == pieces::KING {
                quite_move_bb = (bitboard::BB_KING_ATTACKS[square] & board.bb_empty_squares) | get_castling_king_targets_bb(board, my_color, board.bb_occupied_squares);
                capture_move_bb = bitboard::BB_KING_ATTACKS[square] & board.bb_side[opp_color];
            } else {
                unreachable!("invalid piece id in generate_moves");
            }

            // Non-capture moves (skipped entirely in captures_only mode,
            // except that promotions are generated via the capture path
            // below too -- a non-capturing promotion still counts as
            // "interesting" for quiescence, so push it into quiet_moves
            // unless captures_only, mirroring the rest of quiet handling).
            if !captures_only {
                for m in bitboard::occupied_squares(quite_move_bb) {
                    if piece == pieces::PAWN {
                        push_pawn_move(&mut quiet_moves, my_color, square, m, None, false);
                    } else {
                        quiet_moves.push(ChessMove {
                            start_square: square,
                            end_square: m,
                            piece,
                            captured_piece: None,
                            priority: 0,
                            is_en_passant: false,
                            promotion: None,
                        });
                    }
                }
            } else if piece == pieces::PAWN {
                // In captures-only mode still offer non-capturing
                // promotions, since promoting is never "quiet" in the
                // sense quiescence cares about.
                for m in bitboard::occupied_squares(quite_move_bb) {
                    if is_promotion_square(my_color, m) {
                        push_pawn_move(&mut quiet_moves, my_color, square, m, None, false);
                    }
                }
            }

            // Capture moves
            for m in bitboard::occupied_squares(capture_move_bb) {
                // Figure out the piece that is being captured
                let cap = get_opponents_captured_piece(&board.bb_pieces[opp_color], m, is_en_passant);
                if piece == pieces::PAWN {
                    push_pawn_move(&mut capture_moves, my_color, square, m, Some(cap), is_en_passant);
                } else {
                    capture_moves.push(ChessMove {
                        start_square: square,
                        end_square: m,
                        piece,
                        captured_piece: Some(cap),
                        priority: 0,
                        is_en_passant,
                        promotion: None,
                    });
                }
            }

        }
    }

    // Order capture moves first (by appending quiet moves to the end)
    // This will get re-sorted anyway, but may make the re-sort faster.
    capture_moves.append(&mut quiet_moves);
    capture_moves
}

// Generate psuedo-legal check evasions: every move available while in
// check, used by quiescence search instead of captures-only generation
// (a quiet king step out of check is not something delta pruning
// should ever discard).
pub fn generate_evasion_moves(board: &position::Position, my_color: usize) -> Vec<ChessMove> {
    generate_all_psuedo_legal_moves(board, my_color)
}

// Determines whether a square is attacked by the given side.
fn is_square_attacked_by_side(board: &position::Position, square: usize, by_side_color: usize) -> bool {
    let pawns = board.bb_pieces[by_side_color][pieces::PAWN];
    if bitboard::BB_PAWN_ATTACKS[1 - by_side_color][square] & pawns != 0 {
        return true;
    }
    let knights = board.bb_pieces[by_side_color][pieces::KNIGHT];
    if bitboard::BB_KNIGHT_ATTACKS[square] & knights != 0 {
        return true;
    }
    let king = board.bb_pieces[by_side_color][pieces::KING];
    if bitboard::BB_KING_ATTACKS[square] & king != 0 {
        return true;
    }
    let bishops_queens = board.bb_pieces[by_side_color][pieces::BISHOP] | board.bb_pieces[by_side_color][pieces::QUEEN];
    if (get_diagonal_attacks_bb(board.bb_occupied_squares, square) | get_antidiagonal_attacks_bb(board.bb_occupied_squares, square)) & bishops_queens != 0 {
        return true;
    }
    let rooks_queens = board.bb_pieces[by_side_color][pieces::ROOK] | board.bb_pieces[by_side_color][pieces::QUEEN];
    if (get_rank_attacks_bb(board.bb_occupied_squares, square) | get_file_attacks_bb(board.bb_occupied_squares, square)) & rooks_queens != 0 {
        return true;
    }
    false
}

// Check whether or not the king of the passed in color is in check
pub fn is_king_in_check(board: &position::Position, king_color: usize) -> bool {
    let king_square = match bitboard::bit_scan_forward(board.bb_pieces[king_color][pieces::KING]) {
        Some(e) => e,
        None => panic!("Cannot find king on bitboard"),
    };
    is_square_attacked_by_side(board, king_square, 1 - king_color)
}

// Modify the passed in moves vector to keep only moves that don't leave
// player's king in check.
pub fn retain_only_legal_moves(board: &mut position::Position, moves: &mut Vec<ChessMove>) {
    let my_color = if board.whites_turn {pieces::COLOR_WHITE} else {pieces::COLOR_BLACK};
    moves.retain(|i| {
        board.make_move(i.start_square, i.end_square, i.promotion);
        let keepit = !is_king_in_check(board, my_color);
        board.unmake_move();
        keepit
    });
}

// =====================================
//             UNIT TESTS
// =====================================

#[cfg(test)]
mod tests {

    use super::*;
    use crate::position::Position;

    fn get_number_of_valid_moves(board: &mut Position, depth: usize) -> u64 {
        if depth == 0 {
            return 1;
        }
        let mut move_count = 0;
        let my_color = if board.whites_turn {pieces::COLOR_WHITE} else {pieces::COLOR_BLACK};
        let mut moves = generate_all_psuedo_legal_moves(board, my_color);
        retain_only_legal_moves(board, &mut moves);
        for m in moves.iter() {
            board.make_move(m.start_square, m.end_square, m.promotion);
            move_count += get_number_of_valid_moves(board, depth - 1);
            board.unmake_move();
        }
        move_count
    }

    // Test the number of valid moves
    #[test]
    fn test_perft() {
        let results = [1, 20, 400, 8902, 197281];
        let mut board = Position::new();
        board.new_game();
        for (i, expected) in results.iter().enumerate() {
            let moves = get_number_of_valid_moves(&mut board, i);
            assert_eq!(moves, *expected, "perft mismatch at depth {}", i);
        }
    }

    // Test a capture
    #[test]
    fn test_capture() {
        let mut board = Position::new();
        board.new_game();
        board.make_move(12, 28, None); // e4
        board.make_move(51, 35, None); // d5
        let mut moves = generate_all_psuedo_legal_moves(&board, pieces::COLOR_WHITE);
        retain_only_legal_moves(&mut board, &mut moves);
        let captures = moves.iter().filter(|m| m.captured_piece.is_some()).count();
        assert_eq!(captures, 1);
    }

    #[test]
    fn test_promotion_generates_all_four_choices() {
        let mut board = Position::new();
        board.load_fen("8/4P3/8/8/4k3/8/8/4K3 w - - 0 1").unwrap();
        let moves = generate_all_psuedo_legal_moves(&board, pieces::COLOR_WHITE);
        let promo_count = moves.iter().filter(|m| m.start_square == 52 && m.end_square == 60).count();
        assert_eq!(promo_count, 4);
    }

    #[test]
    fn test_uci_move_round_trip() {
        let parsed = convert_moves_str_into_list("e2e4 e7e8q");
        assert_eq!(parsed[0], (12, 28, None));
        assert_eq!(parsed[1], (52, 60, Some(pieces::QUEEN)));
    }

    #[test]
    fn test_cannot_castle_while_in_check() {
        // Black rook on the e-file checks the white king on e1; white
        // still nominally has kingside castling rights.
        let mut board = Position::new();
        board.load_fen("4r2k/8/8/8/8/8/8/R3K2R w K - 0 1").unwrap();
        let moves = generate_all_psuedo_legal_moves(&board, pieces::COLOR_WHITE);
        assert!(!moves.iter().any(|m| m.start_square == 4 && m.end_square == 6));
    }

    #[test]
    fn test_cannot_castle_through_attacked_square() {
        // Black rook on f-file attacks f1, the square the white king
        // must cross to castle kingside; castling queenside is unaffected.
        let mut board = Position::new();
        board.load_fen("5r1k/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        let moves = generate_all_psuedo_legal_moves(&board, pieces::COLOR_WHITE);
        assert!(!moves.iter().any(|m| m.start_square == 4 && m.end_square == 6));
        assert!(moves.iter().any(|m| m.start_square == 4 && m.end_square == 2));
    }

    #[test]
    fn test_castling_allowed_when_unobstructed_and_safe() {
        let mut board = Position::new();
        board.load_fen("4k3/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        let moves = generate_all_psuedo_legal_moves(&board, pieces::COLOR_WHITE);
        assert!(moves.iter().any(|m| m.start_square == 4 && m.end_square == 6));
        assert!(moves.iter().any(|m| m.start_square == 4 && m.end_square == 2));
    }
}
