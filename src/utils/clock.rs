use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::time::Instant;

/// Source of wall-clock time and monotonic instants for the tracker. Wall-clock time decides
/// partition dates and row timestamps, instants drive the focus timer. Swappable in tests.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Local>;

    fn instant(&self) -> Instant;

    async fn sleep_until(&self, instant: Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Local> {
        Local::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
