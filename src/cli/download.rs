//! Download commands: `maps` (timeline walk) and `rankings` (batch fetch)

use crate::cursor::Cursor;
use crate::downloader::config::{
    API_MAX_RESULTS, BATCH_INTERVAL, BATCH_REQUESTS, CHECKPOINT_EVERY_CHUNKS,
    DEFAULT_CHECKPOINT_DIR, MAX_RANK, MAX_REQUESTS_PER_MINUTE, REQUEST_TIMEOUT_SECS, TOP_SCORES,
};
use crate::downloader::{BatchFetcher, CursorPaginator, DownloadError, HarvestConfig};
use crate::fetcher::osu_api::{DetailQuery, OsuApiClient};
use crate::fetcher::rankings::RankingsScraper;
use crate::resume::{
    Checkpoint, CheckpointStore, FileCheckpointStore, PipelineKind, RunLock,
};
use crate::GameMode;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::CliError;

/// Resume modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Resume from the stored checkpoint if there is one
    On,
    /// Discard the stored checkpoint and start fresh
    Reset,
    /// Load and validate the stored checkpoint, then exit
    Verify,
}

impl FromStr for ResumeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on" => Ok(ResumeMode::On),
            "reset" => Ok(ResumeMode::Reset),
            "verify" => Ok(ResumeMode::Verify),
            _ => Err(format!(
                "Invalid resume mode: {s}. Valid options: on, reset, verify"
            )),
        }
    }
}

/// Parse a positive number of seconds
fn parse_positive_secs(s: &str) -> Result<u64, String> {
    let value: u64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number of seconds"))?;
    if value == 0 {
        return Err("must be at least 1 second".to_string());
    }
    Ok(value)
}

/// CLI structure
#[derive(Debug, Parser)]
#[command(name = "osu-data-downloader")]
#[command(about = "Resumable bulk download of osu! beatmap history and top-player scores", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding checkpoints and lock files
    #[arg(long, global = true, default_value = DEFAULT_CHECKPOINT_DIR)]
    pub checkpoint_dir: PathBuf,

    /// Resume mode: on, reset, or verify
    #[arg(long, global = true, default_value = "on")]
    pub resume: ResumeMode,

    /// osu! API key (takes precedence over --api-key-file)
    #[arg(long, global = true, env = "OSU_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// File containing the osu! API key
    #[arg(long, global = true, default_value = "api.key")]
    pub api_key_file: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = REQUEST_TIMEOUT_SECS, value_parser = parse_positive_secs)]
    pub request_timeout_secs: u64,

    /// Serve Prometheus metrics on this address (e.g., 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download every ranked beatmap's metadata since a start date
    Maps(MapsArgs),

    /// Download the best scores of the top ranked players
    Rankings(RankingsArgs),
}

/// Arguments of `maps`
#[derive(Debug, Args)]
pub struct MapsArgs {
    /// Start of the walk (YYYY-MM-DD or "YYYY-MM-DD HH:MM:SS"); ignored when resuming
    #[arg(long, default_value = "2007-10-07")]
    pub since: String,

    /// Output JSON file
    #[arg(long, default_value = "maps.json")]
    pub output: PathBuf,

    /// Page size at which the cursor steps back one second
    #[arg(long, default_value_t = API_MAX_RESULTS)]
    pub page_cap: usize,

    /// Drop repeated records with the same value of this field from the output
    #[arg(long)]
    pub dedup_key: Option<String>,
}

/// Arguments of `rankings`
#[derive(Debug, Args)]
pub struct RankingsArgs {
    /// Game mode: osu, taiko, fruits, mania
    #[arg(long, default_value = "osu")]
    pub mode: GameMode,

    /// Two-letter country code of a country ranking
    #[arg(long)]
    pub country: Option<String>,

    /// Best scores per user (1-100)
    #[arg(long, default_value_t = TOP_SCORES)]
    pub top_scores: u32,

    /// First rank to fetch (0-based, inclusive)
    #[arg(long, default_value_t = 0)]
    pub start_rank: usize,

    /// Rank to stop at (exclusive)
    #[arg(long, default_value_t = MAX_RANK)]
    pub end_rank: usize,

    /// Users fetched concurrently per chunk
    #[arg(long, default_value_t = BATCH_REQUESTS)]
    pub chunk_size: usize,

    /// Minimum duration of one chunk in seconds
    #[arg(long, default_value_t = BATCH_INTERVAL.as_secs(), value_parser = parse_positive_secs)]
    pub interval_secs: u64,

    /// Save the checkpoint every N chunks
    #[arg(long, default_value_t = CHECKPOINT_EVERY_CHUNKS)]
    pub checkpoint_every: usize,

    /// Refuse chunk settings that would exceed this many requests per minute
    #[arg(long, default_value_t = MAX_REQUESTS_PER_MINUTE)]
    pub max_requests_per_minute: u32,

    /// Output JSON file
    #[arg(long, default_value = "rankings.json")]
    pub output: PathBuf,
}

impl Cli {
    /// Run the selected command
    pub async fn execute(&self) -> Result<(), CliError> {
        let pipeline = match self.command {
            Commands::Maps(_) => PipelineKind::Pagination,
            Commands::Rankings(_) => PipelineKind::Batch,
        };
        let store = FileCheckpointStore::new(&self.checkpoint_dir);

        if self.resume == ResumeMode::Verify {
            return handle_resume_verify(&store, pipeline);
        }

        let mut lock = RunLock::open(&store.lock_path_for(pipeline))?;
        let _guard = lock.try_hold()?;

        if self.resume == ResumeMode::Reset {
            handle_resume_reset(&store, pipeline)?;
        }

        let mut config = HarvestConfig::with_api_key(resolve_api_key(
            self.api_key.as_deref(),
            &self.api_key_file,
        )?);
        config.checkpoint_dir = self.checkpoint_dir.clone();
        config.api.request_timeout = Duration::from_secs(self.request_timeout_secs);
        config
            .api
            .validate()
            .map_err(CliError::ConfigurationError)?;

        let store = Arc::new(store);
        let result = match &self.command {
            Commands::Maps(args) => args.execute(config, store).await,
            Commands::Rankings(args) => args.execute(config, store).await,
        };

        if let Err(CliError::DownloadError(DownloadError::Checkpoint(e))) = &result {
            if e.is_corrupt() {
                error!(
                    pipeline = %pipeline,
                    "Stored checkpoint is unusable; inspect it or rerun with --resume reset"
                );
            }
        }
        result
    }
}

impl MapsArgs {
    async fn execute(
        &self,
        mut config: HarvestConfig,
        store: Arc<FileCheckpointStore>,
    ) -> Result<(), CliError> {
        config.timeline.start = Cursor::parse(&self.since)
            .map_err(|e| CliError::InvalidArgument(format!("Invalid --since: {e}")))?;
        config.timeline.page_cap = self.page_cap;
        config.timeline.output_path = self.output.clone();
        config.timeline.dedup_key = self.dedup_key.clone();
        config
            .timeline
            .validate()
            .map_err(CliError::ConfigurationError)?;

        let client = Arc::new(OsuApiClient::new(&config.api)?.with_page_limit(self.page_cap));
        let paginator = CursorPaginator::new(client, store, config.timeline);
        let report = paginator.run().await?;

        info!(
            pages_fetched = report.pages_fetched,
            pages_total = report.pages_total,
            records = report.records_written,
            duplicates_removed = report.duplicates_removed,
            output = %report.output_path.display(),
            "Beatmap download complete"
        );
        Ok(())
    }
}

impl RankingsArgs {
    async fn execute(
        &self,
        mut config: HarvestConfig,
        store: Arc<FileCheckpointStore>,
    ) -> Result<(), CliError> {
        config.batch.mode = self.mode;
        config.batch.country = self.country.clone();
        config.batch.top_scores = self.top_scores;
        config.batch.start_rank = self.start_rank;
        config.batch.end_rank = self.end_rank;
        config.batch.chunk_size = self.chunk_size;
        config.batch.floor_interval = Duration::from_secs(self.interval_secs);
        config.batch.checkpoint_every = self.checkpoint_every;
        config.batch.max_requests_per_minute = Some(self.max_requests_per_minute);
        config.batch.output_path = self.output.clone();
        config
            .batch
            .validate()
            .map_err(CliError::ConfigurationError)?;

        let detail = Arc::new(OsuApiClient::new(&config.api)?.with_detail_query(DetailQuery {
            mode: self.mode,
            limit: self.top_scores,
        }));
        let enumerator = Arc::new(RankingsScraper::new(
            &config.api,
            self.mode,
            self.country.clone(),
        )?);

        let fetcher = BatchFetcher::new(detail, enumerator, store, config.batch);
        let report = fetcher.run().await?;

        info!(
            chunks_fetched = report.chunks_fetched,
            identifiers = report.identifiers,
            succeeded = report.succeeded,
            failed = report.failed,
            output = %report.output_path.display(),
            "Score download complete"
        );
        Ok(())
    }
}

/// API key from the flag/environment, else the first line of `key_file`
pub fn resolve_api_key(flag: Option<&str>, key_file: &Path) -> Result<String, CliError> {
    if let Some(key) = flag.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    let contents = std::fs::read_to_string(key_file).map_err(|e| {
        CliError::ConfigurationError(format!(
            "No API key given and {} is unreadable ({e}); pass --api-key or set OSU_API_KEY",
            key_file.display()
        ))
    })?;

    let key = contents.trim();
    if key.is_empty() {
        return Err(CliError::ConfigurationError(format!(
            "API key file {} is empty",
            key_file.display()
        )));
    }
    Ok(key.to_string())
}

/// Handle Reset mode: discard the pipeline's checkpoint
fn handle_resume_reset(store: &FileCheckpointStore, pipeline: PipelineKind) -> Result<(), CliError> {
    if store.reset(pipeline)? {
        info!(pipeline = %pipeline, "Reset mode: checkpoint deleted, starting fresh");
    } else {
        info!(pipeline = %pipeline, "Reset mode: no checkpoint to delete");
    }
    Ok(())
}

/// Handle Verify mode: load and validate the pipeline's checkpoint
fn handle_resume_verify(store: &FileCheckpointStore, pipeline: PipelineKind) -> Result<(), CliError> {
    let path = store.path_for(pipeline);
    match store.load(pipeline) {
        Ok(None) => {
            info!(path = %path.display(), "Verify mode: no checkpoint, nothing to verify");
            Ok(())
        }
        Ok(Some(Checkpoint::Pagination(cp))) => {
            info!(
                path = %path.display(),
                cursor = %cp.cursor(),
                pages = cp.pages().len(),
                records = cp.record_count(),
                "Verify passed"
            );
            Ok(())
        }
        Ok(Some(Checkpoint::Batch(cp))) => {
            info!(
                path = %path.display(),
                identifiers = cp.identifiers().len(),
                position = cp.position(),
                results = cp.results().len(),
                failures = cp.failures().len(),
                "Verify passed"
            );
            Ok(())
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Invalid checkpoint");
            Err(CliError::InvalidArgument(format!(
                "Verify failed: {} is unusable ({e}). Use --resume reset to clear.",
                path.display()
            )))
        }
    }
}
