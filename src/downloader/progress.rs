//! Progress reporting for batch runs
//!
//! Calculates percentage, rate and remaining time over the identifier window
//! and decides when a progress line is worth logging.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_PERCENTAGE_STEP: f64 = 10.0;

/// Progress of a batch run through its identifier window
#[derive(Debug, Clone)]
pub struct BatchProgress {
    total: usize,
    consumed: usize,
    consumed_at_start: usize,
    start_time: Instant,
    last_update: Instant,
    update_interval: Duration,
    last_reported_percentage: f64,
    min_percentage_step: f64,
}

impl BatchProgress {
    /// Track a window of `total` identifiers, `consumed` of them already done
    ///
    /// Identifiers consumed before this process started do not count toward
    /// the rate.
    pub fn new(total: usize, consumed: usize) -> Self {
        let now = Instant::now();
        let consumed = consumed.min(total);
        let mut progress = Self {
            total,
            consumed,
            consumed_at_start: consumed,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            last_reported_percentage: 0.0,
            min_percentage_step: DEFAULT_PERCENTAGE_STEP,
        };
        progress.last_reported_percentage = progress.percentage();
        progress
    }

    /// Override how often time-based updates fire
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Set the number of identifiers consumed so far
    pub fn update(&mut self, consumed: usize) {
        self.consumed = consumed.min(self.total);
    }

    /// Identifiers consumed so far
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Completion percentage (0-100)
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.consumed as f64 / self.total as f64) * 100.0
    }

    /// Identifiers per second in this process
    pub fn rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.consumed.saturating_sub(self.consumed_at_start) as f64 / elapsed
    }

    /// Estimated time to finish at the current rate
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let rate = self.rate();
        let remaining = self.total - self.consumed;
        if rate <= 0.0 || remaining == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    /// Whether a progress line should be logged now
    pub fn should_emit_update(&self) -> bool {
        if self.consumed == self.consumed_at_start {
            return false;
        }
        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }
        self.last_update.elapsed() >= self.update_interval
    }

    /// Call after logging a progress line
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Human-readable progress line
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} users - {:.1}% complete",
            self.consumed,
            self.total,
            self.percentage()
        )];

        let rate = self.rate();
        if rate > 0.0 {
            parts.push(format!("at {rate:.1} users/sec"));
        }
        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
