//! Sliding-window admission control for the upstream catalog client (C1).
//!
//! A FIFO of recent acquisition instants, guarded by a single async mutex
//! held across the expire/check/sleep/append sequence so waiters observe
//! approximate FIFO ordering. Not strictly fair under contention, but the
//! daemon only ever has one caller (the orchestrator's single worker), so
//! that doesn't matter in practice.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests as usize,
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    fn expire(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Blocks until a token is available, then consumes it.
    pub async fn acquire(&self) {
        let mut timestamps = self.timestamps.lock().await;
        let mut now = Instant::now();
        Self::expire(&mut timestamps, now, self.window);

        if timestamps.len() >= self.max_requests {
            let oldest = *timestamps.front().expect("len >= max_requests > 0");
            let deadline = oldest + self.window;
            if deadline > now {
                tokio::time::sleep(deadline - now).await;
                now = Instant::now();
                Self::expire(&mut timestamps, now, self.window);
            }
        }

        timestamps.push_back(now);
    }

    /// Non-blocking: seconds until the next acquisition would succeed
    /// without sleeping (zero if one would succeed immediately).
    pub async fn wait_time(&self) -> Duration {
        let mut timestamps = self.timestamps.lock().await;
        let now = Instant::now();
        Self::expire(&mut timestamps, now, self.window);

        if timestamps.len() >= self.max_requests {
            let oldest = *timestamps.front().expect("len >= max_requests > 0");
            let deadline = oldest + self.window;
            deadline.saturating_duration_since(now)
        } else {
            Duration::ZERO
        }
    }
}
