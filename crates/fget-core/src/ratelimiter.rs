//! Process-wide token-bucket rate limiter (C8).
//!
//! Every byte any segment worker writes is accounted against a single shared
//! window. `limit_kb == 0` means unlimited and the limiter becomes a no-op.
//! Very small limits are handled with fractional (`f64`) accounting so a
//! 1 KB/s limit still throttles instead of degrading to unlimited under
//! integer truncation.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

const MAX_SLEEP: Duration = Duration::from_millis(500);
const MIN_WINDOW: Duration = Duration::from_millis(100);

struct State {
    /// Bytes still allowed in the current window, as a fractional allowance.
    allowance: f64,
    window_start: Instant,
}

/// Process-wide rate limiter shared by every active segment worker.
pub struct RateLimiter {
    limit_bytes_per_sec: f64,
    state: Mutex<State>,
}

impl RateLimiter {
    /// Builds a limiter for `limit_kb` KB/s. `0` means unlimited.
    pub fn new(limit_kb: u32) -> Self {
        RateLimiter {
            limit_bytes_per_sec: limit_kb as f64 * 1024.0,
            state: Mutex::new(State {
                allowance: limit_kb as f64 * 1024.0,
                window_start: Instant::now(),
            }),
        }
    }

    /// True if this limiter imposes no limit.
    pub fn is_unlimited(&self) -> bool {
        self.limit_bytes_per_sec <= 0.0
    }

    /// Accounts for `bytes` just written, sleeping if the configured rate has
    /// been exceeded in the current window. A no-op when unlimited.
    pub fn consume(&self, bytes: u64) {
        if self.is_unlimited() || bytes == 0 {
            return;
        }

        let sleep_for = {
            let mut state = self.state.lock().expect("rate limiter mutex poisoned");
            let now = Instant::now();
            let elapsed = now.duration_since(state.window_start);

            if elapsed >= MIN_WINDOW {
                state.allowance = self.limit_bytes_per_sec;
                state.window_start = now;
            }

            state.allowance -= bytes as f64;

            if state.allowance < 0.0 {
                let deficit = -state.allowance;
                let seconds = deficit / self.limit_bytes_per_sec;
                Some(Duration::from_secs_f64(seconds).min(MAX_SLEEP))
            } else {
                None
            }
        };

        if let Some(d) = sleep_for {
            thread::sleep(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_never_sleeps() {
        let limiter = RateLimiter::new(0);
        assert!(limiter.is_unlimited());
        let start = Instant::now();
        limiter.consume(10_000_000);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn small_limit_throttles_not_unlimited() {
        let limiter = RateLimiter::new(1);
        assert!(!limiter.is_unlimited());
        let start = Instant::now();
        limiter.consume(2048); // 2 KiB against a 1 KB/s budget
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[test]
    fn sleep_capped_at_max() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        limiter.consume(10 * 1024 * 1024);
        assert!(start.elapsed() <= Duration::from_millis(600));
    }
}
