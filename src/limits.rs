//! Resource limits and the per-handler circuit breaker.
//!
//! Generalises the codebase's existing resilience idiom (a keyed async
//! lock guarding a single external resource, see
//! [`crate::plugin::ToolCache`]) into a shared component the Solver
//! consults before dispatching work to a plugin handler: a concurrency
//! cap, a retry/backoff policy for [`crate::error::TransientError`], and
//! a circuit breaker that stops hammering a handler that's already
//! failing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Engine-wide tunables, set from CLI flags / environment.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        ResourceLimits {
            max_concurrency: num_cpus_heuristic(),
            max_retries: 3,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(30),
        }
    }
}

impl ResourceLimits {
    /// Exponential backoff with no jitter source available outside
    /// `tokio::time`, so callers add their own jitter if they have a
    /// random source handy; capped at `backoff_max`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        let scaled = self.backoff_base.saturating_mul(factor);
        scaled.min(self.backoff_max)
    }
}

fn num_cpus_heuristic() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerEntry {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Per-handler-name circuit breaker: after `failure_threshold` consecutive
/// [`TransientError`](crate::error::TransientError)s, the breaker opens and
/// rejects new attempts until `reset_after` has elapsed, at which point one
/// probe attempt is allowed through (half-open) to decide whether to close
/// again.
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_after: Duration,
    entries: Mutex<HashMap<String, BreakerEntry>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_after: Duration) -> Self {
        CircuitBreaker { failure_threshold, reset_after, entries: Mutex::new(HashMap::new()) }
    }

    /// True if a call to `handler_name` may proceed right now.
    pub fn allow(&self, handler_name: &str) -> bool {
        let mut entries = self.entries.lock().expect("circuit breaker lock poisoned");
        let entry = entries.entry(handler_name.to_string()).or_insert(BreakerEntry {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        });
        match entry.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = entry.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.reset_after {
                    entry.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, handler_name: &str) {
        let mut entries = self.entries.lock().expect("circuit breaker lock poisoned");
        if let Some(entry) = entries.get_mut(handler_name) {
            entry.state = BreakerState::Closed;
            entry.consecutive_failures = 0;
            entry.opened_at = None;
        }
    }

    pub fn record_failure(&self, handler_name: &str) {
        let mut entries = self.entries.lock().expect("circuit breaker lock poisoned");
        let entry = entries.entry(handler_name.to_string()).or_insert(BreakerEntry {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        });
        entry.consecutive_failures += 1;
        if entry.consecutive_failures >= self.failure_threshold {
            entry.state = BreakerState::Open;
            entry.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let limits = ResourceLimits { max_concurrency: 1, max_retries: 5, backoff_base: Duration::from_millis(100), backoff_max: Duration::from_millis(500) };
        assert_eq!(limits.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(limits.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(limits.backoff_for_attempt(10), Duration::from_millis(500));
    }

    #[test]
    fn breaker_opens_after_threshold_and_blocks() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        assert!(breaker.allow("deploy"));
        breaker.record_failure("deploy");
        assert!(breaker.allow("deploy"));
        breaker.record_failure("deploy");
        assert!(!breaker.allow("deploy"));
    }

    #[test]
    fn breaker_closes_after_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure("deploy");
        assert!(!breaker.allow("deploy"));
        // simulate elapsed reset window by constructing a fresh breaker with a zero window
        let fast = CircuitBreaker::new(1, Duration::from_millis(0));
        fast.record_failure("deploy");
        assert!(fast.allow("deploy")); // half-open probe allowed immediately
        fast.record_success("deploy");
        assert!(fast.allow("deploy"));
    }
}
