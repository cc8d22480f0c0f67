//! Pipeline observability metrics
//!
//! Counters and histograms for pages, detail fetches, checkpoint writes and
//! throttle pacing.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Prometheus exporter for a scraping endpoint, only when an address is given
//! - Without an installed recorder every call is a no-op

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::resume::PipelineKind;

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent; a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address to bind the scrape endpoint (e.g., "127.0.0.1:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "timeline_pages_total",
        Unit::Count,
        "Timeline pages fetched, labelled full or short"
    );

    describe_counter!(
        "timeline_records_total",
        Unit::Count,
        "Records received from the timeline endpoint"
    );

    describe_counter!(
        "detail_fetches_total",
        Unit::Count,
        "Per-identifier detail fetches by outcome"
    );

    describe_histogram!(
        "batch_chunk_duration_seconds",
        Unit::Seconds,
        "Wall-clock time to fetch one chunk, before pacing"
    );

    describe_histogram!(
        "throttle_sleep_seconds",
        Unit::Seconds,
        "Time slept by the throttle after a chunk"
    );

    describe_counter!(
        "checkpoint_writes_total",
        Unit::Count,
        "Checkpoint files persisted"
    );

    describe_histogram!(
        "checkpoint_write_duration_seconds",
        Unit::Seconds,
        "Time to serialize and atomically replace a checkpoint"
    );

    describe_counter!(
        "pipelines_completed_total",
        Unit::Count,
        "Pipeline runs that reached completion"
    );

    describe_counter!(
        "pipelines_failed_total",
        Unit::Count,
        "Pipeline runs that aborted"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Record one timeline page
pub fn record_page(records: usize, full: bool) {
    counter!(
        "timeline_pages_total",
        "kind" => if full { "full" } else { "short" },
    )
    .increment(1);
    counter!("timeline_records_total").increment(records as u64);
}

/// Record the outcome counts of one chunk
pub fn record_chunk(duration: Duration, succeeded: usize, failed: usize) {
    counter!("detail_fetches_total", "outcome" => "success").increment(succeeded as u64);
    counter!("detail_fetches_total", "outcome" => "failure").increment(failed as u64);
    histogram!("batch_chunk_duration_seconds").record(duration.as_secs_f64());
}

/// Record a throttle pause
pub fn record_throttle_sleep(duration: Duration) {
    histogram!("throttle_sleep_seconds").record(duration.as_secs_f64());
}

/// Record a persisted checkpoint
pub fn record_checkpoint_write(pipeline: PipelineKind, duration: Duration) {
    counter!("checkpoint_writes_total", "pipeline" => pipeline.tag()).increment(1);
    histogram!(
        "checkpoint_write_duration_seconds",
        "pipeline" => pipeline.tag(),
    )
    .record(duration.as_secs_f64());
}

/// Run-level metrics for one pipeline
pub struct PipelineMetrics {
    pipeline: PipelineKind,
    start_time: Instant,
}

impl PipelineMetrics {
    /// Start tracking a pipeline run
    pub fn start(pipeline: PipelineKind) -> Self {
        info!(pipeline = %pipeline, "Pipeline started");

        Self {
            pipeline,
            start_time: Instant::now(),
        }
    }

    /// Record completion
    pub fn record_success(&self, items_count: u64) {
        let duration = self.start_time.elapsed();

        counter!(
            "pipelines_completed_total",
            "pipeline" => self.pipeline.tag(),
        )
        .increment(1);

        info!(
            pipeline = %self.pipeline,
            items_count = items_count,
            duration_secs = duration.as_secs(),
            "Pipeline completed successfully"
        );
    }

    /// Record an abort
    pub fn record_failure(&self, error: &str) {
        let duration = self.start_time.elapsed();

        counter!(
            "pipelines_failed_total",
            "pipeline" => self.pipeline.tag(),
        )
        .increment(1);

        error!(
            pipeline = %self.pipeline,
            error = %error,
            duration_secs = duration.as_secs(),
            "Pipeline failed"
        );
    }
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}
