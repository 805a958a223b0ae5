//! Sliding-window rate limiter for upstream API calls.
//!
//! Bounds the aggregate request rate across all callers. A caller that
//! cannot get a slot before its deadline fails with
//! [`SignalError::RateLimited`] instead of queueing forever.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{SignalError, SignalResult};

/// Shared sliding-window limiter (N requests per window).
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    stamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Limiter allowing `per_minute` requests in any 60-second window.
    pub fn per_minute(per_minute: usize) -> Self {
        Self::new(per_minute, Duration::from_secs(60))
    }

    /// Limiter allowing `capacity` requests in any `window`.
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity,
            window,
            stamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Take a request slot, waiting until one frees up.
    ///
    /// Fails with [`SignalError::RateLimited`] when the wait would run
    /// past `deadline`.
    pub async fn acquire(&self, deadline: Instant) -> SignalResult<()> {
        loop {
            let wait = {
                let mut stamps = self.stamps.lock().await;
                let now = Instant::now();
                while stamps
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    stamps.pop_front();
                }
                if stamps.len() < self.capacity {
                    stamps.push_back(now);
                    return Ok(());
                }
                match stamps.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    // Capacity of zero: no slot will ever free up.
                    None => return Err(SignalError::RateLimited),
                }
            };

            if Instant::now() + wait > deadline {
                return Err(SignalError::RateLimited);
            }
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_within_capacity_is_immediate() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let deadline = Instant::now() + Duration::from_millis(10);
        for _ in 0..3 {
            limiter.acquire(deadline).await.unwrap();
        }
    }

    #[tokio::test]
    async fn acquire_past_capacity_fails_at_deadline() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let deadline = Instant::now() + Duration::from_millis(20);

        limiter.acquire(deadline).await.unwrap();
        limiter.acquire(deadline).await.unwrap();

        let result = limiter.acquire(deadline).await;
        assert!(matches!(result, Err(SignalError::RateLimited)));
    }

    #[tokio::test]
    async fn slots_free_up_as_the_window_slides() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));

        let deadline = Instant::now() + Duration::from_secs(1);
        limiter.acquire(deadline).await.unwrap();

        // The second acquire must wait for the window to slide, then succeed.
        let start = Instant::now();
        limiter.acquire(deadline).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn zero_capacity_always_fails() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        let deadline = Instant::now() + Duration::from_millis(10);
        let result = limiter.acquire(deadline).await;
        assert!(matches!(result, Err(SignalError::RateLimited)));
    }
}
