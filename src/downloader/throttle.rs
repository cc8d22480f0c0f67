//! Fixed-window pacing between batch chunks
//!
//! A chunk that finishes faster than the floor interval is padded with a
//! sleep so that the aggregate request rate stays at or below
//! `chunk_size / floor`. No token bucket, no adaptation.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::metrics;

/// Pads each chunk to a minimum wall-clock duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    floor: Duration,
}

impl Throttle {
    /// Throttle with the given floor interval
    pub fn new(floor: Duration) -> Self {
        Self { floor }
    }

    /// Sleep needed after a chunk that took `elapsed`; never negative
    pub fn delay_for(&self, elapsed: Duration) -> Duration {
        self.floor.saturating_sub(elapsed)
    }

    /// Sleep for `max(0, floor - (chunk_end - chunk_start))`
    ///
    /// Returns the time slept.
    pub async fn pace(&self, chunk_start: Instant, chunk_end: Instant) -> Duration {
        let elapsed = chunk_end.saturating_duration_since(chunk_start);
        let delay = self.delay_for(elapsed);

        if !delay.is_zero() {
            debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                sleep_ms = delay.as_millis() as u64,
                "Pacing chunk"
            );
            sleep(delay).await;
        }
        metrics::record_throttle_sleep(delay);
        delay
    }
}
