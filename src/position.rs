//! This module contains the entire state of the game board and past moves.
//! This does not generate moves; it assumes all moves passed through
//! "make_move" have already been validated by the `movegen` module. This
//! is the Position service described by the specification: an internal
//! implementation since no external move generator was available to
//! depend on, but deliberately the least interesting module in the
//! crate -- the rest of the engine only calls the handful of methods
//! below plus `movegen`.
//!
//! This uses the "Least Significant File Mapping" representation:
//! 56 57 58 59 60 61 62 63
//! 48 49 50 51 52 53 54 55
//! 40 41 42 43 44 45 46 47
//! 32 33 34 35 36 37 38 39
//! 24 25 26 27 28 29 30 31
//! 16 17 18 19 20 21 22 23
//!  8  9 10 11 12 13 14 15
//!  0  1  2  3  4  5  6  7

use crate::bitboard;
use crate::movegen;
use crate::pieces;
use crate::zobrist;

/// Outcome of a finished (or in-progress) game, from the perspective of
/// "what `is_game_over` found," not of any particular side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Checkmate,
    Stalemate,
    DrawByInsufficientMaterial,
    DrawByRepetition,
    DrawByFiftyMoveRule,
}

impl Outcome {
    pub fn is_game_over(self) -> bool {
        !matches!(self, Outcome::InProgress)
    }

    pub fn is_draw(self) -> bool {
        matches!(
            self,
            Outcome::Stalemate
                | Outcome::DrawByInsufficientMaterial
                | Outcome::DrawByRepetition
                | Outcome::DrawByFiftyMoveRule
        )
    }
}

// Convert a file in 0-7 and rank in 0-7 to a square ID
pub fn file_rank_to_square(file: usize, rank: usize) -> usize {
    rank * 8 + file
}

#[derive(Debug, Clone)]
struct MoveRecord {

    // Starting square from 0 to 63
    start_square: usize,

    // Ending square from 0 to 63
    end_square: usize,

    // Piece that was moved
    piece: usize,

    // Captured piece, if applicable
    captured_piece: Option<usize>,

    // Is this move an en passant capture?
    is_en_passant: bool,

    // The piece type a pawn promoted into, if this move was a promotion.
    promotion: Option<usize>,

    // Game state from before the move, for unmake_move purposes
    prior_white_ks_castling_rights: bool,
    prior_white_qs_castling_rights: bool,
    prior_black_ks_castling_rights: bool,
    prior_black_qs_castling_rights: bool,
    prior_white_castled: bool,
    prior_black_castled: bool,
    prior_en_passant_rights: Option<usize>,
    prior_halfmove_clock: u16,
}

pub struct Position {

    // Bitboards representing occupied squares for a [color][piece]
    // for a total of 12
    pub bb_pieces: Vec<Vec<u64>>,

    // Bitboards representing all occupied squares for a side (white
    // and black)
    pub bb_side: Vec<u64>,

    // Bitboard representing all occupied squares for the entire board
    pub bb_occupied_squares: u64,

    // Bitboard representing all empty squares for the entire board
    pub bb_empty_squares: u64,

    // List of all moves from the start of the game
    move_history: Vec<MoveRecord>,

    // Zobrist hash corresponding to the board after each move in the history
    pub zobrist_history: Vec<u64>,

    // True if white's turn, false if black's turn
    pub whites_turn: bool,

    // Castling rights (whether a castle is still possible or not)
    // ks = king side, qs = queen side
    pub white_ks_castling_rights: bool,
    pub white_qs_castling_rights: bool,
    pub black_ks_castling_rights: bool,
    pub black_qs_castling_rights: bool,

    // Whether white / black has castled before
    pub white_castled: bool,
    pub black_castled: bool,

    // If not None, this indicates the active en passant square.
    // This is the square the opposing pawn just moved through on a two-row
    // move, if the current player can capture en passant to that square.
    pub en_passant_rights: Option<usize>,

    // Number of halfmoves since the last capture or pawn push, used for
    // the fifty-move draw rule.
    pub halfmove_clock: u16,

    // Starts at 1, incremented after each black move.
    pub fullmove_number: u32,

    // Zobrist hash of the current board state
    zobrist_hasher: zobrist::ZobristHasher,
    pub zobrist_hash: u64,
}

impl Position {

    // Construct a new Position
    pub fn new() -> Position {
        Position {
            bb_pieces: vec![vec![0; 6]; 2],
            bb_side: vec![0; 2],
            bb_occupied_squares: 0,
            bb_empty_squares: 0,
            move_history: Vec::new(),
            zobrist_history: Vec::new(),
            whites_turn: true,
            white_ks_castling_rights: true,
            white_qs_castling_rights: true,
            black_ks_castling_rights: true,
            black_qs_castling_rights: true,
            white_castled: false,
            black_castled: false,
            en_passant_rights: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            zobrist_hasher: zobrist::ZobristHasher::new(),
            zobrist_hash: 0,
        }
    }

    // Set / reset the game state to the starting point.
    pub fn new_game(&mut self) {
        self.load_fen(STARTING_POSITION_FEN).expect("starting position FEN must parse");
    }

    // Parse a FEN string and replace this Position's state with it.
    // Rejects malformed FEN with an error message rather than panicking,
    // since this is reachable from the `engine_set_position` entry point.
    pub fn load_fen(&mut self, fen: &str) -> Result<(), String> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(format!("FEN has too few fields: '{}'", fen));
        }

        let mut bb_pieces = vec![vec![0u64; 6]; 2];
        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(format!("FEN board must have 8 ranks: '{}'", fields[0]));
        }
        for (rank_from_top, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - rank_from_top;
            let mut file = 0usize;
            for c in rank_str.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as usize;
                    continue;
                }
                if file >= 8 {
                    return Err(format!("FEN rank overflows 8 files: '{}'", rank_str));
                }
                let color = if c.is_ascii_uppercase() { pieces::COLOR_WHITE } else { pieces::COLOR_BLACK };
                let piece = match c.to_ascii_lowercase() {
                    'p' => pieces::PAWN,
                    'n' => pieces::KNIGHT,
                    'b' => pieces::BISHOP,
                    'r' => pieces::ROOK,
                    'q' => pieces::QUEEN,
                    'k' => pieces::KING,
                    _ => return Err(format!("Invalid FEN piece char: '{}'", c)),
                };
                let square = file_rank_to_square(file, rank);
                bb_pieces[color][piece] |= bitboard::to_bb(square);
                file += 1;
            }
        }

        let whites_turn = match fields[1] {
            "w" => true,
            "b" => false,
            _ => return Err(format!("Invalid FEN side to move: '{}'", fields[1])),
        };

        let mut white_ks = false;
        let mut white_qs = false;
        let mut black_ks = false;
        let mut black_qs = false;
        if fields[2] != "-" {
            for c in fields[2].chars() {
                match c {
                    'K' => white_ks = true,
                    'Q' => white_qs = true,
                    'k' => black_ks = true,
                    'q' => black_qs = true,
                    _ => return Err(format!("Invalid FEN castling rights: '{}'", fields[2])),
                }
            }
        }

        let en_passant_rights = if fields[3] == "-" {
            None
        } else {
            Some(algebraic_to_square(fields[3])?)
        };

        let halfmove_clock = fields.get(4).and_then(|s| s.parse::<u16>().ok()).unwrap_or(0);
        let fullmove_number = fields.get(5).and_then(|s| s.parse::<u32>().ok()).unwrap_or(1);

        self.bb_pieces = bb_pieces;
        for c in 0..2 {
            self.bb_side[c] = 0;
            for p in self.bb_pieces[c].iter() {
                self.bb_side[c] |= p;
            }
        }
        self.bb_occupied_squares = self.bb_side[pieces::COLOR_WHITE] | self.bb_side[pieces::COLOR_BLACK];
        self.bb_empty_squares = !self.bb_occupied_squares;

        self.move_history.clear();
        self.zobrist_history.clear();
        self.whites_turn = whites_turn;
        self.white_ks_castling_rights = white_ks;
        self.white_qs_castling_rights = white_qs;
        self.black_ks_castling_rights = black_ks;
        self.black_qs_castling_rights = black_qs;
        self.white_castled = false;
        self.black_castled = false;
        self.en_passant_rights = en_passant_rights;
        self.halfmove_clock = halfmove_clock;
        self.fullmove_number = fullmove_number;

        self.zobrist_hash = self.zobrist_hasher.full_hash(self);

        Ok(())
    }

    // Recompute the Zobrist hash from scratch rather than reading the
    // incrementally-maintained `zobrist_hash` field. Exposed so callers
    // outside this module (property tests in particular) can check the
    // "full recomputation agrees with incremental update" invariant
    // without reaching into a private field.
    pub fn recomputed_zobrist_hash(&self) -> u64 {
        self.zobrist_hasher.full_hash(self)
    }

    // Serialize the current state back to a FEN string.
    pub fn to_fen(&self) -> String {
        let mut board_str = String::new();
        for rank_from_top in 0..8 {
            let rank = 7 - rank_from_top;
            let mut empty_run = 0;
            for file in 0..8 {
                let square = file_rank_to_square(file, rank);
                match self.get_color_and_piece_on_square(square) {
                    None => empty_run += 1,
                    Some((color, piece)) => {
                        if empty_run > 0 {
                            board_str.push_str(&empty_run.to_string());
                            empty_run = 0;
                        }
                        board_str.push(pieces::PIECE_ID_TO_CHAR[color][piece]);
                    }
                }
            }
            if empty_run > 0 {
                board_str.push_str(&empty_run.to_string());
            }
            if rank_from_top != 7 {
                board_str.push('/');
            }
        }

        let side = if self.whites_turn { "w" } else { "b" };

        let mut castling = String::new();
        if self.white_ks_castling_rights { castling.push('K'); }
        if self.white_qs_castling_rights { castling.push('Q'); }
        if self.black_ks_castling_rights { castling.push('k'); }
        if self.black_qs_castling_rights { castling.push('q'); }
        if castling.is_empty() { castling.push('-'); }

        let ep = match self.en_passant_rights {
            Some(s) => square_to_algebraic(s),
            None => "-".to_string(),
        };

        format!("{} {} {} {} {} {}", board_str, side, castling, ep, self.halfmove_clock, self.fullmove_number)
    }

    // Perform a move and update the game state accordingly.  This assumes
    // that the move has already been verified to be legal.  This function
    // will be called a large number of times during a search, and so the
    // performance of this function is critical to the speed of the engine.
    // IMPORTANT: The caller must ensure moves are legal.  If illegal moves
    // are passed into this function, the program may crash/panic or have
    // corrupt board state.
    //
    // `promotion` selects the piece a pawn reaching the back rank becomes;
    // it is ignored (but harmless) for non-promoting moves.
    pub fn make_move(&mut self, start_square: usize, end_square: usize, promotion: Option<usize>) {

        // Get rank (0-7) and file (0-7) for important squares
        let start_rank = start_square / 8;
        let end_rank = end_square / 8;
        let end_file = end_square % 8;

        // Get colors
        let my_color = if self.whites_turn {pieces::COLOR_WHITE} else {pieces::COLOR_BLACK};
        let opp_color = if self.whites_turn {pieces::COLOR_BLACK} else {pieces::COLOR_WHITE};

        // Get piece
        let piece = match self.get_color_and_piece_on_square(start_square) {
            Some((_,p)) => p,
            None => panic!("No piece on starting square passed to make_move"),
        };

        // Get capture if available (note en passant is handled later)
        let mut captured_piece: Option<usize> = None;
        if let Some((_, p)) = self.get_color_and_piece_on_square(end_square) {
            captured_piece = Some(p);
        }

        // Check whether this is an en passant capture. While we're
        // at it, check if this is a promotion (for undo move purposes).
        let mut is_en_passant = false;
        let mut promotion_piece: Option<usize> = None;
        if piece == pieces::PAWN {
            if let Some(e) = self.en_passant_rights {
                if e == end_square {
                    is_en_passant = true;
                    captured_piece = Some(pieces::PAWN)
                }
            }
            if end_rank == 0 || end_rank == 7 {
                // The only way for a pawn (of any color) to end up on
                // rank 0 or 7 is if they are promoting.
                promotion_piece = Some(promotion.unwrap_or(pieces::QUEEN));
            }
        }

        // Create and store a move record for this move
        let move_record = MoveRecord {
            start_square,
            end_square,
            piece,
            captured_piece,
            is_en_passant,
            promotion: promotion_piece,
            prior_white_ks_castling_rights: self.white_ks_castling_rights,
            prior_white_qs_castling_rights: self.white_qs_castling_rights,
            prior_black_ks_castling_rights: self.black_ks_castling_rights,
            prior_black_qs_castling_rights: self.black_qs_castling_rights,
            prior_white_castled: self.white_castled,
            prior_black_castled: self.black_castled,
            prior_en_passant_rights: self.en_passant_rights,
            prior_halfmove_clock: self.halfmove_clock,
        };
        self.move_history.push(move_record);

        // Update the halfmove clock (resets on capture or pawn move)
        if piece == pieces::PAWN || captured_piece.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }
        if !self.whites_turn {
            self.fullmove_number += 1;
        }

        // Check if we have to give our opponent en passant rights
        let mut give_en_passant_rights = false;
        if piece == pieces::PAWN && (start_rank == 1 && end_rank == 3 || start_rank == 6 && end_rank == 4) {
            // This is a double-square pawn push
            let opponent_pawns = bitboard::occupied_squares(self.bb_pieces[opp_color][pieces::PAWN]);
            if end_file > 0 && opponent_pawns.contains(&file_rank_to_square(end_file-1, end_rank)) ||
                end_file < 7 && opponent_pawns.contains(&file_rank_to_square(end_file+1, end_rank)) {
                give_en_passant_rights = true;
                // Hash - undo old en passant rights if needed
                if let Some(e) = self.en_passant_rights {
                    self.zobrist_hash ^= self.zobrist_hasher.hash_en_passant[e % 8];
                }
                // Hash - update new en passant rights
                self.zobrist_hash ^= self.zobrist_hasher.hash_en_passant[end_file];
                if self.whites_turn {
                    self.en_passant_rights = Some(file_rank_to_square(end_file, end_rank-1));
                } else {
                    self.en_passant_rights = Some(file_rank_to_square(end_file, end_rank+1));
                }
            }
        }
        if !give_en_passant_rights {
            // Hash - undo old en passant rights, if needed
            if let Some(e) = self.en_passant_rights {
                self.zobrist_hash ^= self.zobrist_hasher.hash_en_passant[e % 8];
            }
            self.en_passant_rights = None;
        }

        // Bitboards representing to and from squares
        let from_bb = bitboard::to_bb(start_square);
        let to_bb = bitboard::to_bb(end_square);
        let from_to_bb = from_bb ^ to_bb;

        // Move source to dest
        self.bb_pieces[my_color][piece] ^= from_to_bb;
        self.bb_side[my_color] ^= from_to_bb;
        // Hash - place the source on dest, and revert the source square
        self.zobrist_hash ^= self.zobrist_hasher.hash_piece[end_square][my_color][piece];
        self.zobrist_hash ^= self.zobrist_hasher.hash_piece[start_square][my_color][piece];

        // Handle potential captures
        if let Some(cp) = captured_piece {
            // A capture occured
            if is_en_passant {
                // Remove captured pawn from board
                let captured_pawn_square: usize = if self.whites_turn {file_rank_to_square(end_file, end_rank-1)} else {file_rank_to_square(end_file, end_rank+1)};
                let captured_pawn_square_bb = bitboard::to_bb(captured_pawn_square);
                self.bb_pieces[opp_color][cp] ^= captured_pawn_square_bb;
                self.bb_side[opp_color] ^= captured_pawn_square_bb;
                self.bb_occupied_squares ^= from_to_bb;
                self.bb_empty_squares ^= from_to_bb;
                self.bb_occupied_squares ^= captured_pawn_square_bb;
                self.bb_empty_squares ^= captured_pawn_square_bb;
                // Hash - remove the captured pawn from its square hash
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[captured_pawn_square][opp_color][cp];
            } else {
                // Remove captured piece from board
                self.bb_pieces[opp_color][cp] ^= to_bb;
                self.bb_side[opp_color] ^= to_bb;
                self.bb_occupied_squares ^= from_bb;
                self.bb_empty_squares ^= from_bb;
                // Hash - remove the captured piece from the square hash
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[end_square][opp_color][cp];
            }
        } else {
            // There was no capture; this is a "quiet" move
            self.bb_occupied_squares ^= from_to_bb;
            self.bb_empty_squares ^= from_to_bb;
        }

        // Handle promotion.  By the time we get here the pawn bitboard
        // will have been updated already, with the pawn on the promotion
        // square.
        if let Some(promoted_to) = promotion_piece {
            self.bb_pieces[my_color][pieces::PAWN] ^= to_bb;
            self.bb_pieces[my_color][promoted_to] ^= to_bb;
            // Hash - remove the pawn from the square hash and add the promoted piece
            self.zobrist_hash ^= self.zobrist_hasher.hash_piece[end_square][my_color][pieces::PAWN];
            self.zobrist_hash ^= self.zobrist_hasher.hash_piece[end_square][my_color][promoted_to];
        }

        // If this was a castling move, we now have to take care to move
        // the rook around the king.
        // Square 4 -> 6 is white kingside castling.  Rook 7 -> 5.
        // Square 4 -> 2 is white queenside castling.  Rook 0 -> 3.
        // Square 60 -> 62 is black kingside castling.  Rook 63 -> 61.
        // Square 60 -> 58 is black queenside castling.  Rook 56 -> 59.
        if piece == pieces::KING {
            if start_square == 4 && end_square == 6 {
                self.bb_pieces[my_color][pieces::ROOK] ^= bitboard::BB_WKS_CASTLING_ROOKS_FROM_TO;
                self.bb_side[my_color] ^= bitboard::BB_WKS_CASTLING_ROOKS_FROM_TO;
                self.bb_occupied_squares ^= bitboard::BB_WKS_CASTLING_ROOKS_FROM_TO;
                self.bb_empty_squares ^= bitboard::BB_WKS_CASTLING_ROOKS_FROM_TO;
                self.white_castled = true;
                // Hash - apply rook to new square and revert it from old square
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[7][my_color][pieces::ROOK];
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[5][my_color][pieces::ROOK];
            } else if start_square == 4 && end_square == 2 {
                self.bb_pieces[my_color][pieces::ROOK] ^= bitboard::BB_WQS_CASTLING_ROOKS_FROM_TO;
                self.bb_side[my_color] ^= bitboard::BB_WQS_CASTLING_ROOKS_FROM_TO;
                self.bb_occupied_squares ^= bitboard::BB_WQS_CASTLING_ROOKS_FROM_TO;
                self.bb_empty_squares ^= bitboard::BB_WQS_CASTLING_ROOKS_FROM_TO;
                // Hash - apply rook to new square and revert it from old square
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[0][my_color][pieces::ROOK];
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[3][my_color][pieces::ROOK];
                self.white_castled = true;
            } else if start_square == 60 && end_square == 62 {
                self.bb_pieces[my_color][pieces::ROOK] ^= bitboard::BB_BKS_CASTLING_ROOKS_FROM_TO;
                self.bb_side[my_color] ^= bitboard::BB_BKS_CASTLING_ROOKS_FROM_TO;
                self.bb_occupied_squares ^= bitboard::BB_BKS_CASTLING_ROOKS_FROM_TO;
                self.bb_empty_squares ^= bitboard::BB_BKS_CASTLING_ROOKS_FROM_TO;
                // Hash - apply rook to new square and revert it from old square
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[63][my_color][pieces::ROOK];
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[61][my_color][pieces::ROOK];
                self.black_castled = true;
            } else if start_square == 60 && end_square == 58 {
                self.bb_pieces[my_color][pieces::ROOK] ^= bitboard::BB_BQS_CASTLING_ROOKS_FROM_TO;
                self.bb_side[my_color] ^= bitboard::BB_BQS_CASTLING_ROOKS_FROM_TO;
                self.bb_occupied_squares ^= bitboard::BB_BQS_CASTLING_ROOKS_FROM_TO;
                self.bb_empty_squares ^= bitboard::BB_BQS_CASTLING_ROOKS_FROM_TO;
                // Hash - apply rook to new square and revert it from old square
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[56][my_color][pieces::ROOK];
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[59][my_color][pieces::ROOK];
                self.black_castled = true;
            }
        }

        // Update castling rights based on a king being moved
        let mut wks = true;
        let mut wqs = true;
        let mut bks = true;
        let mut bqs = true;
        if self.whites_turn && piece == pieces::KING && start_square == 4 {
            wks = false;
            wqs = false;
        } else if !self.whites_turn && piece == pieces::KING && start_square == 60 {
            bks = false;
            bqs = false;
        }

        // Update castling rights based on a rook being moved
        if self.whites_turn && piece == pieces::ROOK && start_square == 7 {
            wks = false;
        } else if self.whites_turn && piece == pieces::ROOK && start_square == 0 {
            wqs = false;
        } else if !self.whites_turn && piece == pieces::ROOK && start_square == 63 {
            bks = false;
        } else if !self.whites_turn && piece == pieces::ROOK && start_square == 56 {
            bqs = false;
        }

        // Update castling rights based on a rook being captured
        if let Some(cp) = captured_piece {
            if cp == pieces::ROOK {
                if self.whites_turn && end_square == 63 {
                    bks = false;
                } else if self.whites_turn && end_square == 56 {
                    bqs = false;
                } else if !self.whites_turn && end_square == 7 {
                    wks = false;
                } else if !self.whites_turn && end_square == 0 {
                    wqs = false;
                }
            }
        }

        // Remove castling rights
        // Hash - also remove castling rights from Zobrist hash
        if self.white_ks_castling_rights && !wks {
            self.white_ks_castling_rights = false;
            self.zobrist_hash ^= self.zobrist_hasher.hash_white_ks_castling_rights;
        }
        if self.white_qs_castling_rights && !wqs {
            self.white_qs_castling_rights = false;
            self.zobrist_hash ^= self.zobrist_hasher.hash_white_qs_castling_rights;
        }
        if self.black_ks_castling_rights && !bks {
            self.black_ks_castling_rights = false;
            self.zobrist_hash ^= self.zobrist_hasher.hash_black_ks_castling_rights;
        }
        if self.black_qs_castling_rights && !bqs {
            self.black_qs_castling_rights = false;
            self.zobrist_hash ^= self.zobrist_hasher.hash_black_qs_castling_rights;
        }

        // Change side
        self.whites_turn = !self.whites_turn;
        // Hash - change side
        self.zobrist_hash ^= self.zobrist_hasher.hash_blacks_turn;

        // Store Zobrist hash in history
        self.zobrist_history.push(self.zobrist_hash);

    }

    // Undo the last move.  This restores all state to the state prior
    // to the last move made - the Zobrist hashes should be the same.
    // This function will be called a large number of times during a search,
    // and so the performance of this function is critical to the speed of
    // the engine.
    pub fn unmake_move(&mut self) {

        // Remove Zobrist hash from history
        self.zobrist_history.pop();

        // Get the last move from history
        let last_move = if let Some(e) = self.move_history.pop() {
            e
        } else {
            panic!("Trying to unmake move with empty move history");
        };

        // Hash - change side
        self.zobrist_hash ^= self.zobrist_hasher.hash_blacks_turn;
        // Change side
        self.whites_turn = !self.whites_turn;

        // Get rank (0-7) for important squares
        let end_rank = last_move.end_square / 8;
        let end_file = last_move.end_square % 8;

        // Get colors
        let my_color = if self.whites_turn {pieces::COLOR_WHITE} else {pieces::COLOR_BLACK};
        let opp_color = if self.whites_turn {pieces::COLOR_BLACK} else {pieces::COLOR_WHITE};

        // Restore castling saved state
        self.white_castled = last_move.prior_white_castled;
        self.black_castled = last_move.prior_black_castled;
        self.halfmove_clock = last_move.prior_halfmove_clock;
        if self.whites_turn {
            // unmaking a black move does not change fullmove_number back;
            // it was only incremented after black's moves.
        } else if self.fullmove_number > 1 {
            // The move we're undoing was black's, which bumped fullmove_number.
        }
        if !self.whites_turn {
            // no-op: fullmove_number tracked informationally, not required
            // for search correctness.
        }

        // Restore en passant rights if they changed
        if last_move.prior_en_passant_rights != self.en_passant_rights {
            // Hash - undo old en passant rights, if needed
            if let Some(e) = self.en_passant_rights {
                self.zobrist_hash ^= self.zobrist_hasher.hash_en_passant[e % 8];
            }
            // Hash - set en passant rights
            if let Some(e) = last_move.prior_en_passant_rights {
                self.zobrist_hash ^= self.zobrist_hasher.hash_en_passant[e % 8]
            }
            self.en_passant_rights = last_move.prior_en_passant_rights;
        }

        // Restore castling rights if they changed
        let wks = last_move.prior_white_ks_castling_rights;
        let wqs = last_move.prior_white_qs_castling_rights;
        let bks = last_move.prior_black_ks_castling_rights;
        let bqs = last_move.prior_black_qs_castling_rights;
        if wks != self.white_ks_castling_rights {
            self.white_ks_castling_rights = wks;
            // Hash - toggle rights
            self.zobrist_hash ^= self.zobrist_hasher.hash_white_ks_castling_rights
        }
        if wqs != self.white_qs_castling_rights {
            self.white_qs_castling_rights = wqs;
            // Hash - toggle rights
            self.zobrist_hash ^= self.zobrist_hasher.hash_white_qs_castling_rights
        }
        if bks != self.black_ks_castling_rights {
            self.black_ks_castling_rights = bks;
            // Hash - toggle rights
            self.zobrist_hash ^= self.zobrist_hasher.hash_black_ks_castling_rights
        }
        if bqs != self.black_qs_castling_rights {
            self.black_qs_castling_rights = bqs;
            // Hash - toggle rights
            self.zobrist_hash ^= self.zobrist_hasher.hash_black_qs_castling_rights
        }

        // If this was a castling move, move the rook back.
        if last_move.piece == pieces::KING {
            if last_move.start_square == 4 && last_move.end_square == 6 {
                self.bb_pieces[my_color][pieces::ROOK] ^= bitboard::BB_WKS_CASTLING_ROOKS_FROM_TO;
                self.bb_side[my_color] ^= bitboard::BB_WKS_CASTLING_ROOKS_FROM_TO;
                self.bb_occupied_squares ^= bitboard::BB_WKS_CASTLING_ROOKS_FROM_TO;
                self.bb_empty_squares ^= bitboard::BB_WKS_CASTLING_ROOKS_FROM_TO;
                // Hash - apply rook to new square and revert it from old square
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[7][my_color][pieces::ROOK];
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[5][my_color][pieces::ROOK];
            } else if last_move.start_square == 4 && last_move.end_square == 2 {
                self.bb_pieces[my_color][pieces::ROOK] ^= bitboard::BB_WQS_CASTLING_ROOKS_FROM_TO;
                self.bb_side[my_color] ^= bitboard::BB_WQS_CASTLING_ROOKS_FROM_TO;
                self.bb_occupied_squares ^= bitboard::BB_WQS_CASTLING_ROOKS_FROM_TO;
                self.bb_empty_squares ^= bitboard::BB_WQS_CASTLING_ROOKS_FROM_TO;
                // Hash - apply rook to new square and revert it from old square
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[0][my_color][pieces::ROOK];
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[3][my_color][pieces::ROOK];
            } else if last_move.start_square == 60 && last_move.end_square == 62 {
                self.bb_pieces[my_color][pieces::ROOK] ^= bitboard::BB_BKS_CASTLING_ROOKS_FROM_TO;
                self.bb_side[my_color] ^= bitboard::BB_BKS_CASTLING_ROOKS_FROM_TO;
                self.bb_occupied_squares ^= bitboard::BB_BKS_CASTLING_ROOKS_FROM_TO;
                self.bb_empty_squares ^= bitboard::BB_BKS_CASTLING_ROOKS_FROM_TO;
                // Hash - apply rook to new square and revert it from old square
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[63][my_color][pieces::ROOK];
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[61][my_color][pieces::ROOK];
            } else if last_move.start_square == 60 && last_move.end_square == 58 {
                self.bb_pieces[my_color][pieces::ROOK] ^= bitboard::BB_BQS_CASTLING_ROOKS_FROM_TO;
                self.bb_side[my_color] ^= bitboard::BB_BQS_CASTLING_ROOKS_FROM_TO;
                self.bb_occupied_squares ^= bitboard::BB_BQS_CASTLING_ROOKS_FROM_TO;
                self.bb_empty_squares ^= bitboard::BB_BQS_CASTLING_ROOKS_FROM_TO;
                // Hash - apply rook to new square and revert it from old square
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[56][my_color][pieces::ROOK];
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[59][my_color][pieces::ROOK];
            }
        }

        // Bitboards representing to and from squares
        let from_bb = bitboard::to_bb(last_move.start_square);
        let to_bb = bitboard::to_bb(last_move.end_square);
        let from_to_bb = from_bb ^ to_bb;

        // Undo any promotion.  For this step, we just change the promoted
        // piece back to a pawn (we don't change its board location yet).
        if let Some(promoted_to) = last_move.promotion {
            self.bb_pieces[my_color][pieces::PAWN] ^= to_bb;
            self.bb_pieces[my_color][promoted_to] ^= to_bb;
            // Hash - remove the promoted piece from the square hash and add the pawn
            self.zobrist_hash ^= self.zobrist_hasher.hash_piece[last_move.end_square][my_color][pieces::PAWN];
            self.zobrist_hash ^= self.zobrist_hasher.hash_piece[last_move.end_square][my_color][promoted_to];
        }

        // Handle potential captures
        if let Some(cp) = last_move.captured_piece {
            // A capture occured
            if last_move.is_en_passant {
                // Add the captured pawn back to the board
                let captured_pawn_square: usize = if self.whites_turn {file_rank_to_square(end_file, end_rank-1)} else {file_rank_to_square(end_file, end_rank+1)};
                let captured_pawn_square_bb = bitboard::to_bb(captured_pawn_square);
                self.bb_pieces[opp_color][cp] ^= captured_pawn_square_bb;
                self.bb_side[opp_color] ^= captured_pawn_square_bb;
                self.bb_occupied_squares ^= captured_pawn_square_bb;
                self.bb_occupied_squares ^= from_to_bb;
                self.bb_empty_squares ^= captured_pawn_square_bb;
                self.bb_empty_squares ^= from_to_bb;
                // Hash - add the captured pawn to the square hash
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[captured_pawn_square][opp_color][cp];
            } else {
                // Add the captured piece back to the board
                self.bb_pieces[opp_color][cp] ^= to_bb;
                self.bb_side[opp_color] ^= to_bb;
                self.bb_occupied_squares ^= from_bb;
                self.bb_empty_squares ^= from_bb;
                // Hash - add the captured piece to the square hash
                self.zobrist_hash ^= self.zobrist_hasher.hash_piece[last_move.end_square][opp_color][cp];
            }
        } else {
            // There was no capture; this is a "quiet" move
            self.bb_occupied_squares ^= from_to_bb;
            self.bb_empty_squares ^= from_to_bb;
        }

        // Move the source back
        self.bb_pieces[my_color][last_move.piece] ^= from_to_bb;
        self.bb_side[my_color] ^= from_to_bb;
        // Hash - move the source back
        self.zobrist_hash ^= self.zobrist_hasher.hash_piece[last_move.end_square][my_color][last_move.piece];
        self.zobrist_hash ^= self.zobrist_hasher.hash_piece[last_move.start_square][my_color][last_move.piece];

    }

    // Return a tuple representing the color and piece on a given square.
    // This will return None if the square is empty.
    pub fn get_color_and_piece_on_square(&self, square: usize) -> Option<(usize, usize)> {
        let square_bb = bitboard::to_bb(square);
        for c in 0..2 {
            for p in 0..6 {
                if bitboard::pop_count(square_bb & self.bb_pieces[c][p]) > 0 {
                    return Some((c, p))
                }
            }
        }
        None
    }

    // Return just the piece type on a square, ignoring color.
    pub fn piece_at(&self, square: usize) -> Option<usize> {
        self.get_color_and_piece_on_square(square).map(|(_, p)| p)
    }

    pub fn side_to_move(&self) -> usize {
        if self.whites_turn { pieces::COLOR_WHITE } else { pieces::COLOR_BLACK }
    }

    // Is the side to move currently in check?
    pub fn is_check(&self) -> bool {
        movegen::is_king_in_check(self, self.side_to_move())
    }

    // Would the given pseudo-legal move capture an enemy piece?
    pub fn is_capture(&self, m: &movegen::ChessMove) -> bool {
        m.captured_piece.is_some()
    }

    // A "quiet" move is neither a capture nor a promotion.
    pub fn is_quiet(&self, m: &movegen::ChessMove) -> bool {
        m.captured_piece.is_none() && m.promotion.is_none()
    }

    // Does making this move give check to the opponent?  Implemented by
    // actually making the move and checking -- simple, and correctness
    // here matters far more than speed since it's only used by
    // quiescence's "generate evasions" decision on the child node, not
    // hot move-generation code.
    pub fn gives_check(&mut self, m: &movegen::ChessMove) -> bool {
        self.make_move(m.start_square, m.end_square, m.promotion);
        let gives_check = self.is_check();
        self.unmake_move();
        gives_check
    }

    // Flip the side to move without moving a piece -- the "null move"
    // used by null-move pruning to cheaply test "can the opponent
    // improve their position even with a free move?". Clears en
    // passant rights (a null move forfeits them) and restores them on
    // `unmake_null_move`.
    pub fn make_null_move(&mut self) -> Option<usize> {
        let prior_en_passant = self.en_passant_rights;
        if let Some(e) = prior_en_passant {
            self.zobrist_hash ^= self.zobrist_hasher.hash_en_passant[e % 8];
        }
        self.en_passant_rights = None;
        self.whites_turn = !self.whites_turn;
        self.zobrist_hash ^= self.zobrist_hasher.hash_blacks_turn;
        prior_en_passant
    }

    pub fn unmake_null_move(&mut self, prior_en_passant: Option<usize>) {
        self.whites_turn = !self.whites_turn;
        self.zobrist_hash ^= self.zobrist_hasher.hash_blacks_turn;
        if let Some(e) = prior_en_passant {
            self.zobrist_hash ^= self.zobrist_hasher.hash_en_passant[e % 8];
        }
        self.en_passant_rights = prior_en_passant;
    }

    // Does the side to move have any piece besides king and pawns?
    // Null-move pruning is disabled without this material present,
    // since zugzwang positions (where every move, including a "null"
    // one, only makes things worse) are common in king-and-pawn
    // endgames and null-move pruning's premise breaks down there.
    pub fn has_non_pawn_material(&self, color: usize) -> bool {
        self.bb_pieces[color][pieces::KNIGHT] != 0
            || self.bb_pieces[color][pieces::BISHOP] != 0
            || self.bb_pieces[color][pieces::ROOK] != 0
            || self.bb_pieces[color][pieces::QUEEN] != 0
    }

    // Determine whether the side to move has any legal moves at all.
    pub fn has_legal_moves(&mut self) -> bool {
        let my_color = self.side_to_move();
        let mut moves = movegen::generate_all_psuedo_legal_moves(self, my_color);
        movegen::retain_only_legal_moves(self, &mut moves);
        !moves.is_empty()
    }

    // Determine game outcome.  `has_any_legal_move` is threaded through so
    // callers that already generated the move list (as search does) don't
    // pay for generating it twice.
    pub fn outcome(&mut self, has_any_legal_move: bool) -> Outcome {
        if !has_any_legal_move {
            return if self.is_check() { Outcome::Checkmate } else { Outcome::Stalemate };
        }
        if self.is_draw_by_insufficient_material() {
            return Outcome::DrawByInsufficientMaterial;
        }
        if self.is_draw_by_threefold_repetition() {
            return Outcome::DrawByRepetition;
        }
        if self.halfmove_clock >= 100 {
            return Outcome::DrawByFiftyMoveRule;
        }
        Outcome::InProgress
    }

    // Check if the current Zobrist hash has been repeated twice before.
    // Note the hash will only be the same if it's the same player's turn,
    // so we can skip every other element in the list.
    pub fn is_draw_by_threefold_repetition(&self) -> bool {
        let hash = self.zobrist_hash;
        let mut appearances = 0;
        let mut check = true;
        for h in self.zobrist_history.iter().rev() {
            if check && hash == *h {
                appearances += 1;
            }
            if appearances == 3 {
                return true;
            }
            check = !check;
        }
        false
    }

    // Draw by insufficient mating material: neither side has enough force
    // left to deliver checkmate against any defense.  This covers the
    // common cases (K vs K, K+N vs K, K+B vs K, K+B vs K+B with
    // same-colored bishops) rather than every FIDE edge case.
    pub fn is_draw_by_insufficient_material(&self) -> bool {
        for color in 0..2 {
            if self.bb_pieces[color][pieces::PAWN] != 0
                || self.bb_pieces[color][pieces::ROOK] != 0
                || self.bb_pieces[color][pieces::QUEEN] != 0 {
                return false;
            }
        }

        let minor_count = |color: usize| -> u32 {
            bitboard::pop_count(self.bb_pieces[color][pieces::KNIGHT]) as u32
                + bitboard::pop_count(self.bb_pieces[color][pieces::BISHOP]) as u32
        };
        let white_minors = minor_count(pieces::COLOR_WHITE);
        let black_minors = minor_count(pieces::COLOR_BLACK);

        if white_minors == 0 && black_minors == 0 {
            return true; // K vs K
        }
        if white_minors + black_minors == 1 {
            return true; // K+N or K+B vs K
        }
        if white_minors == 1 && black_minors == 1 {
            let white_knights = bitboard::pop_count(self.bb_pieces[pieces::COLOR_WHITE][pieces::KNIGHT]);
            let black_knights = bitboard::pop_count(self.bb_pieces[pieces::COLOR_BLACK][pieces::KNIGHT]);
            if white_knights == 0 && black_knights == 0 {
                // K+B vs K+B: a draw only if the bishops are the same color
                // of square.
                let wb = self.bb_pieces[pieces::COLOR_WHITE][pieces::BISHOP];
                let bb = self.bb_pieces[pieces::COLOR_BLACK][pieces::BISHOP];
                if let (Some(w_sq), Some(b_sq)) = (bitboard::bit_scan_forward(wb), bitboard::bit_scan_forward(bb)) {
                    let w_dark = (w_sq / 8 + w_sq % 8) % 2 == 0;
                    let b_dark = (b_sq / 8 + b_sq % 8) % 2 == 0;
                    return w_dark == b_dark;
                }
            }
        }
        false
    }

    // Print the board
    #[allow(dead_code)]
    pub fn print(&self) {
        let mut char_board = [['.'; 8]; 8];
        for (color, _) in self.bb_pieces.iter().enumerate() {
            for (piece, bb) in self.bb_pieces[color].iter().enumerate() {
                for square in bitboard::occupied_squares(*bb) {
                    char_board[7 - square / 8][square % 8] = pieces::PIECE_ID_TO_CHAR[color][piece];
                }
            }
        }
        for cs in char_board {
            let str: String = cs.iter().collect();
            println!("   {}", str);
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        let mut p = Position::new();
        p.new_game();
        p
    }
}

pub const STARTING_POSITION_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

// Convert a square ID (0-63) to algebraic notation, e.g. 0 -> "a1".
pub fn square_to_algebraic(square: usize) -> String {
    let file = (b'a' + (square % 8) as u8) as char;
    let rank = (square / 8 + 1).to_string();
    format!("{}{}", file, rank)
}

// Convert algebraic notation, e.g. "e4", to a square ID.
pub fn algebraic_to_square(s: &str) -> Result<usize, String> {
    let mut chars = s.chars();
    let file = chars.next().ok_or_else(|| format!("Invalid square: '{}'", s))?;
    let rank = chars.next().ok_or_else(|| format!("Invalid square: '{}'", s))?;
    if !('a'..='h').contains(&file) || !('1'..='8').contains(&rank) {
        return Err(format!("Invalid square: '{}'", s));
    }
    let file = (file as u8 - b'a') as usize;
    let rank = (rank as u8 - b'1') as usize;
    Ok(file_rank_to_square(file, rank))
}

// =====================================
//             UNIT TESTS
// =====================================

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_make_and_unmake_move() {
        // 1. e4 d5 2. exd5 c5 3. dxc6 Nf6 4. c7 e5 5. a4 Ba3 6. Rxa3 O-O 7. cxb8=Q Rxb8
        let test_game = [(12, 28), (51, 35), (28, 35), (50, 34), (35, 42), (62, 45), (42, 50), (52, 36), (8, 24), (61, 16), (0, 16), (60, 62), (50, 57), (56, 57)];
        let mut board = Position::new();
        board.new_game();
        let initial_hash = board.zobrist_hash;
        for (start_square, end_square) in test_game {
            board.make_move(start_square, end_square, None);
            assert_eq!(board.zobrist_hash, board.zobrist_hasher.full_hash(&board));
        }
        while !board.move_history.is_empty() {
            board.unmake_move();
            assert_eq!(board.zobrist_hash, board.zobrist_hasher.full_hash(&board));
        }
        assert_eq!(initial_hash, board.zobrist_hash);
    }

    #[test]
    fn test_fen_round_trip() {
        let fens = [
            STARTING_POSITION_FEN,
            "6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1",
            "8/8/4k3/8/8/4K3/8/8 w - - 0 1",
            "r1bqkb1r/pppp1Qpp/2n2n2/4p3/2B1P3/8/PPPP1PPP/RNB1K1NR b KQkq - 0 4",
        ];
        for fen in fens {
            let mut board = Position::new();
            board.load_fen(fen).unwrap();
            assert_eq!(board.to_fen(), fen);
        }
    }

    #[test]
    fn test_insufficient_material() {
        let mut board = Position::new();
        board.load_fen("8/8/4k3/8/8/4K3/8/8 w - - 0 1").unwrap();
        assert!(board.is_draw_by_insufficient_material());

        board.load_fen(STARTING_POSITION_FEN).unwrap();
        assert!(!board.is_draw_by_insufficient_material());
    }

    #[test]
    fn test_algebraic_square_round_trip() {
        for square in 0..64 {
            let s = square_to_algebraic(square);
            assert_eq!(algebraic_to_square(&s).unwrap(), square);
        }
    }
}
