//! Computes a per-move time budget from a clock state and publishes a
//! deadline that the search core polls cooperatively.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

// How often (in nodes) the search core checks the deadline/abort flag.
pub const NODE_POLL_INTERVAL: u64 = 4096;

const MIN_BUDGET: Duration = Duration::from_millis(10);
const SAFETY_MARGIN: Duration = Duration::from_millis(50);

// Clock state as reported by the driver (UCI `go wtime/btime/winc/binc`,
// or a fixed move time).
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    pub remaining: Duration,
    pub increment: Duration,
}

impl Clock {
    pub fn new(remaining: Duration, increment: Duration) -> Clock {
        Clock { remaining, increment }
    }
}

// Computes how much of the remaining clock to spend on this move.
pub fn compute_budget(clock: Clock, time_weight: f64, increment_weight: f64) -> Duration {
    let remaining_ms = clock.remaining.as_secs_f64() * 1000.0;
    let increment_ms = clock.increment.as_secs_f64() * 1000.0;
    let budget_ms = time_weight * remaining_ms + increment_weight * increment_ms;

    let safety_floor_ms = (clock.remaining.saturating_sub(SAFETY_MARGIN)).as_secs_f64() * 1000.0;
    let max_ms = safety_floor_ms.max(MIN_BUDGET.as_secs_f64() * 1000.0);
    let clamped_ms = budget_ms.clamp(MIN_BUDGET.as_secs_f64() * 1000.0, max_ms);
    Duration::from_secs_f64(clamped_ms / 1000.0)
}

// A deadline shared between the driver thread and search, published as
// an atomic millisecond timestamp relative to `start_instant` plus a
// cooperative abort flag forced on by an explicit `stop`.
pub struct Deadline {
    start: Instant,
    budget_ms: AtomicU64,
    aborted: AtomicBool,
}

impl Deadline {
    pub fn new(budget: Duration) -> Deadline {
        Deadline {
            start: Instant::now(),
            budget_ms: AtomicU64::new(budget.as_millis() as u64),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn force_stop(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    pub fn is_expired(&self) -> bool {
        if self.aborted.load(Ordering::Relaxed) {
            return true;
        }
        let budget_ms = self.budget_ms.load(Ordering::Relaxed);
        self.start.elapsed().as_millis() as u64 >= budget_ms
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms.load(Ordering::Relaxed))
    }

    // Should the driver start another iterative-deepening iteration?
    // Per the time manager contract, no: once more than half the
    // budget has been spent, the next (much more expensive) depth is
    // unlikely to finish anyway.
    pub fn should_start_next_iteration(&self) -> bool {
        !self.is_expired() && self.elapsed().as_secs_f64() <= 0.5 * self.budget().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_respects_minimum() {
        let clock = Clock::new(Duration::from_millis(1), Duration::from_millis(0));
        let budget = compute_budget(clock, 0.02, 0.5);
        assert!(budget >= MIN_BUDGET);
    }

    #[test]
    fn test_budget_respects_safety_margin() {
        let clock = Clock::new(Duration::from_millis(100), Duration::from_millis(0));
        let budget = compute_budget(clock, 5.0, 0.5);
        assert!(budget <= clock.remaining);
    }

    #[test]
    fn test_force_stop_expires_immediately() {
        let deadline = Deadline::new(Duration::from_secs(60));
        assert!(!deadline.is_expired());
        deadline.force_stop();
        assert!(deadline.is_expired());
    }
}
