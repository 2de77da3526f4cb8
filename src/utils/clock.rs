use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of wall-clock and monotonic time for the daemon loops. Injected so
/// tests can drive the tick and maintenance schedules deterministically.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    /// Wall-clock time, used for session boundaries and stored timestamps.
    fn time(&self) -> DateTime<Utc>;

    /// Monotonic reference used to schedule ticks.
    fn instant(&self) -> Instant;

    async fn sleep(&self, duration: Duration);

    async fn sleep_until(&self, instant: Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
