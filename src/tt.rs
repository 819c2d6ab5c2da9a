//! Transposition table: a fixed-capacity, open-addressed cache of
//! previously-searched positions keyed by Zobrist hash.
//!
//! Each slot stores a packed 64-bit `data` word next to a `checksum`
//! word computed as `key ^ data` (the "xor trick", see
//! https://www.chessprogramming.org/Shared_Hash_Table#Xor). On probe we
//! recompute `checksum ^ data` and require it to equal the probing key;
//! a non-atomic, torn read across two racing writers will, with
//! overwhelming probability, fail that check and be treated as a miss
//! rather than handed back as a corrupt hit. This is what lets Lazy SMP
//! workers share one table with plain `Vec<Slot>` storage instead of a
//! lock.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::movegen::ChessMove;
use crate::pieces;

pub const MATE: i32 = 100_000;
pub const MAX_PLY: i32 = 128;
pub const MATE_THRESHOLD: i32 = MATE - MAX_PLY;
pub const INF: i32 = MATE + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TTFlag {
    Exact,
    Lower,
    Upper,
}

impl TTFlag {
    fn to_bits(self) -> u64 {
        match self {
            TTFlag::Exact => 0,
            TTFlag::Lower => 1,
            TTFlag::Upper => 2,
        }
    }
    fn from_bits(bits: u64) -> TTFlag {
        match bits {
            0 => TTFlag::Exact,
            1 => TTFlag::Lower,
            _ => TTFlag::Upper,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TTEntry {
    pub depth: i8,
    pub flag: TTFlag,
    pub score: i32,
    pub best_move: Option<CompactMove>,
    pub generation: u8,
}

// A move packed into 16 bits: 6 bits from, 6 bits to, 3 bits promotion
// (0 = none, 1..=4 = N/B/R/Q). This is enough to reconstruct a move
// against the position it was probed from without storing a full
// `ChessMove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactMove(pub u16);

impl CompactMove {
    pub fn from_move(m: &ChessMove) -> CompactMove {
        let promo_bits: u16 = match m.promotion {
            None => 0,
            Some(pieces::KNIGHT) => 1,
            Some(pieces::BISHOP) => 2,
            Some(pieces::ROOK) => 3,
            Some(pieces::QUEEN) => 4,
            Some(_) => 0,
        };
        let bits = (m.start_square as u16) | ((m.end_square as u16) << 6) | (promo_bits << 12);
        CompactMove(bits)
    }

    pub fn start_square(self) -> usize {
        (self.0 & 0x3f) as usize
    }

    pub fn end_square(self) -> usize {
        ((self.0 >> 6) & 0x3f) as usize
    }

    pub fn promotion(self) -> Option<usize> {
        match (self.0 >> 12) & 0x7 {
            1 => Some(pieces::KNIGHT),
            2 => Some(pieces::BISHOP),
            3 => Some(pieces::ROOK),
            4 => Some(pieces::QUEEN),
            _ => None,
        }
    }

    // Does this compact move match a pseudo-legal move generated from
    // the current position? Used to re-attach a full `ChessMove`
    // (captured piece, priority, etc.) from the move list rather than
    // fabricating one from the bare squares.
    pub fn matches(self, m: &ChessMove) -> bool {
        self.start_square() == m.start_square
            && self.end_square() == m.end_square
            && self.promotion() == m.promotion
    }
}

// The packed score field is 18 bits wide (not 16) because `MATE` plus
// the deepest possible ply adjustment (`MAX_PLY`) exceeds what fits in
// an i16: `score_to_tt(MATE, MAX_PLY) == MATE + MAX_PLY == 100_128`,
// well outside [-32768, 32767] but comfortably inside an 18-bit signed
// range of [-131072, 131071].
const SCORE_BITS: u32 = 18;
const SCORE_MASK: u64 = (1 << SCORE_BITS) - 1;

// Sign-extend the low `bits` bits of `value` into a full i32.
fn sign_extend(value: u64, bits: u32) -> i32 {
    let shift = 32 - bits;
    (((value as u32) << shift) as i32) >> shift
}

fn pack(depth: i8, flag: TTFlag, score: i32, best_move: Option<CompactMove>, generation: u8) -> u64 {
    let depth_bits = (depth as u8) as u64;
    let flag_bits = flag.to_bits();
    let score_bits = (score as i64 as u64) & SCORE_MASK;
    let move_bits = best_move.map(|m| m.0).unwrap_or(0) as u64;
    depth_bits
        | (flag_bits << 8)
        | (score_bits << 10)
        | (move_bits << (10 + SCORE_BITS))
        | ((generation as u64) << (10 + SCORE_BITS + 16))
}

fn unpack(data: u64) -> TTEntry {
    let depth = (data & 0xff) as u8 as i8;
    let flag = TTFlag::from_bits((data >> 8) & 0x3);
    let score = sign_extend((data >> 10) & SCORE_MASK, SCORE_BITS);
    let move_bits = ((data >> (10 + SCORE_BITS)) & 0xffff) as u16;
    let generation = ((data >> (10 + SCORE_BITS + 16)) & 0xff) as u8;
    TTEntry {
        depth,
        flag,
        score,
        best_move: if move_bits == 0 { None } else { Some(CompactMove(move_bits)) },
        generation,
    }
}

struct Slot {
    checksum: AtomicU64,
    data: AtomicU64,
}

impl Slot {
    fn empty() -> Slot {
        Slot {
            checksum: AtomicU64::new(0),
            data: AtomicU64::new(0),
        }
    }
}

pub struct TranspositionTable {
    slots: Vec<Slot>,
    mask: u64,
    generation: AtomicU64,
}

impl TranspositionTable {
    // `capacity_log2` controls table size: 2^capacity_log2 slots.
    pub fn new(capacity_log2: u32) -> TranspositionTable {
        let capacity = 1usize << capacity_log2;
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::empty);
        TranspositionTable {
            slots,
            mask: (capacity as u64) - 1,
            generation: AtomicU64::new(0),
        }
    }

    pub fn generation(&self) -> u8 {
        (self.generation.load(Ordering::Relaxed) & 0xff) as u8
    }

    // Bump the generation counter. Called on `engine_new_game` so stale
    // entries from a previous game lose their depth-preservation
    // priority and get evicted naturally as new entries are stored.
    pub fn new_generation(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.checksum.store(0, Ordering::Relaxed);
            slot.data.store(0, Ordering::Relaxed);
        }
    }

    fn index(&self, key: u64) -> usize {
        (key & self.mask) as usize
    }

    // Probe the table. Adjusts a mate score found at `ply` back to a
    // "distance from root" score as read (see `score_from_tt`).
    pub fn probe(&self, key: u64, ply: i32) -> Option<TTEntry> {
        let slot = &self.slots[self.index(key)];
        let checksum = slot.checksum.load(Ordering::Relaxed);
        let data = slot.data.load(Ordering::Relaxed);
        if data == 0 && checksum == 0 {
            return None;
        }
        if checksum ^ data != key {
            // Either a genuine miss, or a torn read racing a concurrent
            // writer. Either way, treat as a miss -- this is the only
            // handling TTCorrupt ever gets; it is never surfaced as an
            // error to a caller.
            return None;
        }
        let mut entry = unpack(data);
        entry.score = score_from_tt(entry.score, ply);
        Some(entry)
    }

    // Store a result. Preserves an existing entry only when it has
    // strictly greater depth and matches the current generation --
    // otherwise this is an always-replace scheme.
    pub fn store(&self, key: u64, depth: i8, flag: TTFlag, score: i32, best_move: Option<CompactMove>, ply: i32) {
        let slot = &self.slots[self.index(key)];
        let checksum = slot.checksum.load(Ordering::Relaxed);
        let existing_data = slot.data.load(Ordering::Relaxed);
        let generation = self.generation();
        if checksum ^ existing_data == key {
            let existing = unpack(existing_data);
            if existing.generation == generation && existing.depth > depth {
                return;
            }
        }
        let stored_score = score_to_tt(score, ply);
        let data = pack(depth, flag, stored_score, best_move, generation);
        slot.data.store(data, Ordering::Relaxed);
        slot.checksum.store(key ^ data, Ordering::Relaxed);
    }
}

// Convert a score found at a given search ply into a ply-independent
// "mate distance from this node" value before storing, so a cached
// mate score read back at a different ply (distance from root) can be
// corrected relative to the new root.
pub fn score_to_tt(score: i32, ply: i32) -> i32 {
    if score >= MATE_THRESHOLD {
        score + ply
    } else if score <= -MATE_THRESHOLD {
        score - ply
    } else {
        score
    }
}

// Inverse of `score_to_tt`: adjust a stored mate score back to be
// relative to the current search ply.
pub fn score_from_tt(score: i32, ply: i32) -> i32 {
    if score >= MATE_THRESHOLD {
        score - ply
    } else if score <= -MATE_THRESHOLD {
        score + ply
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_probe_round_trip() {
        let tt = TranspositionTable::new(10);
        let key = 0xdead_beef_cafe_f00d;
        tt.store(key, 5, TTFlag::Exact, 123, None, 0);
        let entry = tt.probe(key, 0).expect("entry should be present");
        assert_eq!(entry.depth, 5);
        assert_eq!(entry.flag, TTFlag::Exact);
        assert_eq!(entry.score, 123);
    }

    #[test]
    fn test_probe_miss_on_different_key() {
        let tt = TranspositionTable::new(10);
        tt.store(42, 5, TTFlag::Exact, 1, None, 0);
        assert!(tt.probe(43, 0).is_none());
    }

    #[test]
    fn test_deeper_entry_preserved_same_generation() {
        let tt = TranspositionTable::new(10);
        let key = 7;
        tt.store(key, 10, TTFlag::Exact, 50, None, 0);
        tt.store(key, 3, TTFlag::Exact, -50, None, 0);
        let entry = tt.probe(key, 0).unwrap();
        assert_eq!(entry.depth, 10);
        assert_eq!(entry.score, 50);
    }

    #[test]
    fn test_new_generation_allows_overwrite_of_deeper_entry() {
        let tt = TranspositionTable::new(10);
        let key = 7;
        tt.store(key, 10, TTFlag::Exact, 50, None, 0);
        tt.new_generation();
        tt.store(key, 1, TTFlag::Exact, -50, None, 0);
        let entry = tt.probe(key, 0).unwrap();
        assert_eq!(entry.depth, 1);
    }

    #[test]
    fn test_mate_score_ply_adjustment_round_trips() {
        let tt = TranspositionTable::new(10);
        let key = 99;
        let mate_in_3_from_this_node = MATE - 3;
        tt.store(key, 4, TTFlag::Exact, mate_in_3_from_this_node, None, 5);
        let entry = tt.probe(key, 5).unwrap();
        assert_eq!(entry.score, mate_in_3_from_this_node);
    }

    // A 16-bit packed score field wraps `score_to_tt(MATE, ply)` for any
    // ply > 0 (it exceeds i16::MAX). Pin the widest case -- mate stored
    // at the deepest ply -- to guard against that regression.
    #[test]
    fn test_widest_mate_score_does_not_truncate() {
        let tt = TranspositionTable::new(10);
        let key = 0x1234;
        tt.store(key, 1, TTFlag::Exact, MATE, None, MAX_PLY);
        let entry = tt.probe(key, MAX_PLY).unwrap();
        assert_eq!(entry.score, MATE);

        let key2 = 0x5678;
        tt.store(key2, 1, TTFlag::Exact, -MATE, None, MAX_PLY);
        let entry2 = tt.probe(key2, MAX_PLY).unwrap();
        assert_eq!(entry2.score, -MATE);
    }

    #[test]
    fn test_compact_move_round_trip() {
        let m = ChessMove {
            start_square: 12,
            end_square: 28,
            piece: pieces::PAWN,
            captured_piece: None,
            priority: 0,
            is_en_passant: false,
            promotion: Some(pieces::QUEEN),
        };
        let compact = CompactMove::from_move(&m);
        assert_eq!(compact.start_square(), 12);
        assert_eq!(compact.end_square(), 28);
        assert_eq!(compact.promotion(), Some(pieces::QUEEN));
        assert!(compact.matches(&m));
    }
}
