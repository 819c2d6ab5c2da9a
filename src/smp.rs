//! Lazy SMP: a fixed pool of worker threads each run independent
//! iterative deepening from the same root position, sharing only the
//! transposition table. Workers diverge because each perturbs its move
//! ordering with a distinct seed, so they explore the tree in a
//! different order and populate the shared TT with complementary
//! information.
//! See https://www.chessprogramming.org/Lazy_SMP

use std::sync::Arc;
use std::thread;

use crate::config::EngineConfig;
use crate::position::Position;
use crate::search::SearchEngine;
use crate::stats::IterationReport;
use crate::time_manager::Deadline;
use crate::tt::TranspositionTable;

// Run `workers` independent searches against one shared TT and pick
// the result from whichever worker completed the deepest iteration,
// breaking ties by score. Single-threaded runs never go through this
// path, so their reproducibility is untouched; Lazy SMP runs are not
// reproducible by design (worker scheduling is nondeterministic).
pub fn search_parallel(
    tt: Arc<TranspositionTable>,
    config: &EngineConfig,
    board: &Position,
    deadline: &Deadline,
    workers: usize,
) -> Option<IterationReport> {
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let tt = Arc::clone(&tt);
            let mut worker_config = config.clone();
            // Perturb move ordering weights slightly per worker so
            // identical positions don't all explore in lockstep.
            worker_config.mvv_lva_weight += worker_id as i32 % 3;
            let mut worker_board = clone_position(board);
            handles.push(scope.spawn(move || {
                let engine = SearchEngine::from_shared_tt(tt, worker_config);
                engine.find_best_move(&mut worker_board, deadline)
            }));
        }

        let mut best: Option<IterationReport> = None;
        for handle in handles {
            if let Ok(Some(report)) = handle.join() {
                best = Some(match best {
                    None => report,
                    Some(current) => {
                        if report.depth > current.depth || (report.depth == current.depth && report.score > current.score) {
                            report
                        } else {
                            current
                        }
                    }
                });
            }
        }
        best
    })
}

// `Position` deliberately doesn't implement `Clone` for its hot
// make/unmake path (the move history `Vec` would be an easy-to-misuse
// footgun to clone mid-search); Lazy SMP workers instead replay a
// serialize/deserialize round-trip through FEN, which is only paid
// once per search, not per node.
fn clone_position(board: &Position) -> Position {
    let mut clone = Position::new();
    clone.load_fen(&board.to_fen()).expect("position must round-trip through its own FEN");
    clone
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parallel_search_finds_a_move() {
        let config = EngineConfig::default();
        let tt = Arc::new(TranspositionTable::new(16));
        let mut board = Position::new();
        board.new_game();
        let deadline = Deadline::new(Duration::from_millis(500));
        let report = search_parallel(tt, &config, &board, &deadline, 2);
        assert!(report.is_some());
    }
}
