use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Admits at most one engine call per interval across every task sharing it.
///
/// The interval is drawn from `[min_interval, max_interval]` on each
/// acquisition so calls do not land on a fixed cadence.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    max_interval: Duration,
    last_admission: Mutex<Option<Instant>>,
    admissions: AtomicU64,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            min_interval,
            max_interval: max_interval.max(min_interval),
            last_admission: Mutex::new(None),
            admissions: AtomicU64::new(0),
        }
    }

    pub fn fixed(interval: Duration) -> Self {
        Self::new(interval, interval)
    }

    pub fn unlimited() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub async fn acquire(&self) {
        // The lock is held across the sleep so waiters queue in order.
        let mut last = self.last_admission.lock().await;

        if let Some(previous) = *last {
            let wait_until = previous + self.next_interval();
            if wait_until > Instant::now() {
                tokio::time::sleep_until(wait_until).await;
            }
        }

        *last = Some(Instant::now());
        self.admissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admissions(&self) -> u64 {
        self.admissions.load(Ordering::Relaxed)
    }

    fn next_interval(&self) -> Duration {
        if self.max_interval <= self.min_interval {
            return self.min_interval;
        }
        let span = (self.max_interval - self.min_interval).as_millis() as u64;
        self.min_interval + Duration::from_millis(fastrand::u64(0..=span))
    }
}
