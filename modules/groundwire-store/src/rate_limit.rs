use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Process-wide requests-per-second ceiling for the storage gateway.
///
/// Callers are serialized through a single slot clock: each acquire claims
/// the next slot and sleeps until it arrives. Simpler than a refillable
/// bucket and sufficient for the DB_RPS contract.
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(rps: u32) -> Self {
        let rps = rps.max(1);
        Self {
            min_interval: Duration::from_secs_f64(1.0 / rps as f64),
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Wait for the next request slot.
    pub async fn acquire(&self) {
        let mut next = self.next_slot.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep_until(*next).await;
        }
        let base = (*next).max(now);
        *next = base + self.min_interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spaces_requests_at_the_configured_rate() {
        let limiter = RateLimiter::new(10); // 100ms interval
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        // First slot is immediate, the next two are spaced 100ms apart.
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn zero_rps_is_clamped() {
        let limiter = RateLimiter::new(0);
        limiter.acquire().await; // must not divide by zero or hang
    }
}
