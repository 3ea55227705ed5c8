//! Fixed-window rate limiter for model calls.
//!
//! Allows at most `max_calls` acquisitions per `interval`. Callers that
//! exceed the budget sleep until the current window closes.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
struct Window {
    started_at: Option<Instant>,
    used: u32,
}

/// Calls-per-interval limiter, independent of what is being paced.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: u32,
    interval: Duration,
    window: Mutex<Window>,
}

impl RateLimiter {
    /// `max_calls` per `interval`. A zero budget or zero interval disables limiting.
    pub fn new(max_calls: u32, interval: Duration) -> Self {
        Self {
            max_calls,
            interval,
            window: Mutex::new(Window::default()),
        }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_calls == 0 || self.interval.is_zero()
    }

    /// Wait until a call is permitted, then consume one slot.
    pub async fn acquire(&self) {
        if self.is_unlimited() {
            return;
        }

        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                match window.started_at {
                    Some(start) if now.duration_since(start) < self.interval => {
                        if window.used < self.max_calls {
                            window.used += 1;
                            return;
                        }
                        self.interval - now.duration_since(start)
                    }
                    _ => {
                        window.started_at = Some(now);
                        window.used = 1;
                        return;
                    }
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, pausing");
            tokio::time::sleep(wait).await;
        }
    }
}
