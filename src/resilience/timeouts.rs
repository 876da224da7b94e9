//! Timeout enforcement.
//!
//! # Responsibilities
//! - Track one deadline across every attempt of a downstream exchange
//! - Split what is left between the attempts still allowed
//! - Decide whether a backoff sleep still fits
//!
//! # Design Decisions
//! - Uses Tokio's clock, like the sleeps and timeouts it bounds
//! - A timed-out exchange is reported as `UpstreamError::Timeout` (504)
//! - The last attempt always gets the whole remainder

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Even share of the remaining time for one of `attempts_left` attempts.
    pub fn share(&self, attempts_left: u32) -> Duration {
        self.remaining() / attempts_left.max(1)
    }

    /// Whether `delay` can elapse with time left for another attempt.
    pub fn fits(&self, delay: Duration) -> bool {
        self.remaining() > delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_runs_down() {
        let deadline = Deadline::after(Duration::from_millis(300));
        assert!(deadline.fits(Duration::from_millis(100)));
        assert!(!deadline.fits(Duration::from_millis(400)));

        tokio::time::sleep(Duration::from_millis(320)).await;
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert_eq!(deadline.budget(), Duration::from_millis(300));
    }

    #[test]
    fn share_splits_the_remainder() {
        let deadline = Deadline::after(Duration::from_secs(3));
        assert!(deadline.share(3) <= Duration::from_secs(1));
        assert!(deadline.share(3) > Duration::from_millis(900));
        assert!(deadline.share(0) > Duration::from_millis(2_900));
    }
}
