//! Shared HTTP client for the osu! endpoints
//!
//! Requests are sent exactly once. Retrying is the pipelines' business: the
//! paginator aborts and resumes from its checkpoint, the batch fetcher drops
//! the identifier.

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::downloader::config::ApiConfig;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::RawRecord;

/// Build the underlying reqwest client with the configured timeouts
pub fn build_http_client(config: &ApiConfig) -> FetcherResult<Client> {
    Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(concat!("osu-data-downloader/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FetcherError::NetworkError(format!("Failed to build HTTP client: {e}")))
}

/// GET an unsigned page (HTML listings) and return its body
pub async fn get_page(client: &Client, url: &str, params: &[(&str, String)]) -> FetcherResult<String> {
    debug!(url = %url, params = params.len(), "GET page");

    let response = client
        .get(url)
        .query(params)
        .send()
        .await
        .map_err(|e| FetcherError::NetworkError(e.to_string()))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!(url = %url, "Rate limit error (429)");
        return Err(FetcherError::RateLimitExceeded);
    }
    if !status.is_success() {
        return Err(FetcherError::HttpError(format!("{url} returned {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| FetcherError::NetworkError(e.to_string()))
}

/// HTTP client that signs JSON API calls with the API key
#[derive(Clone)]
pub struct OsuHttpClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OsuHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsuHttpClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl OsuHttpClient {
    /// Create a client for `config.base_url`
    pub fn new(config: &ApiConfig) -> FetcherResult<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// GET `{base_url}/{endpoint}` with the API key and `params`
    ///
    /// The key travels as the `k` query parameter and is stripped from any
    /// transport error before it reaches a log line.
    pub async fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> FetcherResult<Value> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(endpoint = %endpoint, params = params.len(), "GET");

        let response = self
            .client
            .get(&url)
            .query(&[("k", self.api_key.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|e| FetcherError::NetworkError(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetcherError::NetworkError(e.without_url().to_string()))?;

        classify_response(status, &body)
    }
}

/// Map a response to a JSON value or the matching [`FetcherError`]
///
/// The service reports refusals (bad key, quota) as `{"error": "..."}`, with
/// or without an error status, so the payload is checked in both cases.
pub fn classify_response(status: StatusCode, body: &str) -> FetcherResult<Value> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!("Rate limit error (429)");
        return Err(FetcherError::RateLimitExceeded);
    }

    let parsed = serde_json::from_str::<Value>(body);

    if let Ok(Value::Object(obj)) = &parsed {
        if let Some(message) = obj.get("error") {
            let message = message
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| message.to_string());
            warn!(status = %status, error = %message, "API refused request");
            return Err(FetcherError::ApiError(message));
        }
    }

    if !status.is_success() {
        return Err(FetcherError::HttpError(format!("server returned {status}")));
    }

    parsed.map_err(|e| FetcherError::ParseError(format!("Failed to deserialize response: {e}")))
}

/// Split a JSON array response into raw records
pub fn parse_records(value: Value) -> FetcherResult<Vec<RawRecord>> {
    let Value::Array(items) = value else {
        return Err(FetcherError::InvalidResponse(format!(
            "expected array, got {}",
            json_kind(&value)
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(FetcherError::InvalidResponse(format!(
                "item {i}: expected object, got {}",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
