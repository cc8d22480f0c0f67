//! Test doubles for the source traits and the checkpoint store

#![allow(dead_code)]

use async_trait::async_trait;
use osu_data_downloader::cursor::Cursor;
use osu_data_downloader::fetcher::{
    DetailSource, FetcherError, FetcherResult, ListEnumerator, TimelineSource,
};
use osu_data_downloader::resume::{
    Checkpoint, CheckpointRef, CheckpointStore, FileCheckpointStore, PipelineKind, ResumeError,
};
use osu_data_downloader::{RawRecord, UserId};
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared call counter
#[derive(Clone, Default)]
pub struct FetchTracker {
    call_count: Arc<Mutex<usize>>,
}

impl FetchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Increment and return the 1-based number of this call
    pub fn increment(&self) -> usize {
        let mut count = self.call_count.lock().unwrap();
        *count += 1;
        *count
    }
}

/// A beatmap record with an id and approval timestamp
pub fn beatmap(id: usize, approved_date: &str) -> RawRecord {
    json!({
        "beatmap_id": id.to_string(),
        "approved_date": approved_date,
        "title": format!("map {id}"),
    })
    .as_object()
    .cloned()
    .unwrap()
}

/// In-memory timeline that answers like the real endpoint
///
/// Returns up to `page_cap` records strictly after `since`, in order. The
/// call numbered `fail_on_call` (1-based) fails with `failure` instead.
pub struct SyntheticTimeline {
    records: Vec<RawRecord>,
    page_cap: usize,
    fail_on_call: Option<(usize, FetcherError)>,
    pub tracker: FetchTracker,
    pub requested: Arc<Mutex<Vec<Cursor>>>,
}

impl SyntheticTimeline {
    pub fn new(records: Vec<RawRecord>, page_cap: usize) -> Self {
        Self {
            records,
            page_cap,
            fail_on_call: None,
            tracker: FetchTracker::new(),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_on(mut self, call: usize, error: FetcherError) -> Self {
        self.fail_on_call = Some((call, error));
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .map(Cursor::to_string)
            .collect()
    }
}

#[async_trait]
impl TimelineSource for SyntheticTimeline {
    async fn fetch_page(&self, since: Cursor) -> FetcherResult<Vec<RawRecord>> {
        let call = self.tracker.increment();
        self.requested.lock().unwrap().push(since);

        if let Some((n, error)) = &self.fail_on_call {
            if *n == call {
                return Err(error.clone());
            }
        }

        Ok(self
            .records
            .iter()
            .filter(|r| {
                let date = r["approved_date"].as_str().unwrap();
                Cursor::from_ordering_key(date).unwrap() > since
            })
            .take(self.page_cap)
            .cloned()
            .collect())
    }
}

/// Detail source answering one record per user after `latency`
pub struct FakeScores {
    latency: Duration,
    transient: HashSet<UserId>,
    fatal: HashSet<UserId>,
    pub tracker: FetchTracker,
}

impl FakeScores {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            transient: HashSet::new(),
            fatal: HashSet::new(),
            tracker: FetchTracker::new(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing(mut self, ids: &[UserId]) -> Self {
        self.transient.extend(ids);
        self
    }

    pub fn refusing(mut self, ids: &[UserId]) -> Self {
        self.fatal.extend(ids);
        self
    }
}

#[async_trait]
impl DetailSource for FakeScores {
    async fn fetch_detail(&self, user_id: UserId) -> FetcherResult<Vec<RawRecord>> {
        self.tracker.increment();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fatal.contains(&user_id) {
            return Err(FetcherError::ApiError("Please provide a valid API key.".into()));
        }
        if self.transient.contains(&user_id) {
            return Err(FetcherError::NetworkError("connection reset by peer".into()));
        }
        Ok(vec![json!({"user_id": user_id.to_string(), "pp": "727.0"})
            .as_object()
            .cloned()
            .unwrap()])
    }
}

/// Enumerator returning a fixed ranking
pub struct FakeRankings {
    ids: Vec<UserId>,
    pub tracker: FetchTracker,
    pub page_counts: Arc<Mutex<Vec<usize>>>,
}

impl FakeRankings {
    pub fn new(ids: Vec<UserId>) -> Self {
        Self {
            ids,
            tracker: FetchTracker::new(),
            page_counts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ListEnumerator for FakeRankings {
    async fn enumerate(&self, page_count: usize) -> FetcherResult<Vec<UserId>> {
        self.tracker.increment();
        self.page_counts.lock().unwrap().push(page_count);
        Ok(self.ids.clone())
    }
}

/// File store that remembers every checkpoint it was asked to save
pub struct RecordingStore {
    inner: FileCheckpointStore,
    pub saved: Mutex<Vec<Checkpoint>>,
}

impl RecordingStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            inner: FileCheckpointStore::new(dir),
            saved: Mutex::new(Vec::new()),
        }
    }

    /// Positions of every saved batch checkpoint, in save order
    pub fn saved_positions(&self) -> Vec<usize> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .filter_map(|cp| match cp {
                Checkpoint::Batch(b) => Some(b.position()),
                Checkpoint::Pagination(_) => None,
            })
            .collect()
    }
}

impl CheckpointStore for RecordingStore {
    fn load(&self, pipeline: PipelineKind) -> Result<Option<Checkpoint>, ResumeError> {
        self.inner.load(pipeline)
    }

    fn save(&self, checkpoint: CheckpointRef<'_>) -> Result<(), ResumeError> {
        self.inner.save(checkpoint)?;
        let owned = match checkpoint {
            CheckpointRef::Batch(b) => Checkpoint::Batch(b.clone()),
            CheckpointRef::Pagination(p) => Checkpoint::Pagination(p.clone()),
        };
        self.saved.lock().unwrap().push(owned);
        Ok(())
    }
}

/// Minimal HTTP/1.1 server on a loopback port
///
/// `respond` maps the request target (path and query) to a status and body.
/// Every request target is recorded in arrival order.
pub struct LoopbackServer {
    pub addr: std::net::SocketAddr,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl LoopbackServer {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let respond = Arc::new(respond);

        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let seen = Arc::clone(&seen);
                let respond = Arc::clone(&respond);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf);
                    let target = head
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    seen.lock().unwrap().push(target.clone());

                    let (status, body) = respond(&target);
                    let response = format!(
                        "HTTP/1.1 {status} Status\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}
