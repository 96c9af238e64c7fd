//! Classification throttle
//!
//! A single permit gates classification. Whoever holds it is the one
//! classification in flight; the permit goes back no earlier than the
//! configured interval after that classification started, so the effective
//! rate is bounded regardless of frame rate or inference latency.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Rate limiter for emotion classification
#[derive(Debug, Clone)]
pub struct ClassificationThrottle {
    permit: Arc<Semaphore>,
    interval: Duration,
}

impl ClassificationThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            permit: Arc::new(Semaphore::new(1)),
            interval,
        }
    }

    /// Claim the slot for one classification, or `None` if one is still in
    /// flight (the caller drops the frame).
    pub fn try_begin(&self) -> Option<ThrottleTicket> {
        let permit = self.permit.clone().try_acquire_owned().ok()?;
        Some(ThrottleTicket {
            permit,
            release_at: Instant::now() + self.interval,
        })
    }

    /// Whether a classification currently holds the slot
    pub fn is_busy(&self) -> bool {
        self.permit.available_permits() == 0
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Proof of an in-flight classification
///
/// Dropping the ticket frees the slot immediately; [`release`](Self::release)
/// holds it until the interval has elapsed.
#[derive(Debug)]
pub struct ThrottleTicket {
    permit: OwnedSemaphorePermit,
    release_at: Instant,
}

impl ThrottleTicket {
    /// Wait out the rest of the interval, then free the slot
    pub async fn release(self) {
        tokio::time::sleep_until(self.release_at).await;
        drop(self.permit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_second_begin_is_refused_while_busy() {
        let throttle = ClassificationThrottle::new(Duration::from_millis(70));
        let ticket = throttle.try_begin().expect("first begin succeeds");
        assert!(throttle.is_busy());
        assert!(throttle.try_begin().is_none());

        ticket.release().await;
        assert!(!throttle.is_busy());
        assert!(throttle.try_begin().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_waits_for_interval() {
        let throttle = ClassificationThrottle::new(Duration::from_millis(70));
        let started = Instant::now();
        let ticket = throttle.try_begin().unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        ticket.release().await;

        assert!(started.elapsed() >= Duration::from_millis(70));
        assert!(!throttle.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_classification_releases_immediately_after() {
        let throttle = ClassificationThrottle::new(Duration::from_millis(70));
        let ticket = throttle.try_begin().unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let before = Instant::now();
        ticket.release().await;

        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_dropped_ticket_frees_slot() {
        let throttle = ClassificationThrottle::new(Duration::from_secs(60));
        let ticket = throttle.try_begin().unwrap();
        drop(ticket);
        assert!(throttle.try_begin().is_some());
    }
}
