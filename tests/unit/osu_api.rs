//! v1 API client against a loopback server

use crate::support::LoopbackServer;
use osu_data_downloader::cursor::Cursor;
use osu_data_downloader::downloader::ApiConfig;
use osu_data_downloader::fetcher::osu_api::{DetailQuery, OsuApiClient};
use osu_data_downloader::fetcher::{DetailSource, FetcherError, TimelineSource};
use osu_data_downloader::GameMode;
use std::time::Duration;

const KEY: &str = "secret-key";

fn client(base_url: String) -> OsuApiClient {
    let config = ApiConfig {
        api_key: KEY.to_string(),
        base_url,
        request_timeout: Duration::from_secs(5),
        ..ApiConfig::default()
    };
    OsuApiClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_fetch_page_sends_key_and_cursor() {
    let server = LoopbackServer::start(|_| {
        (
            200,
            r#"[{"beatmap_id":"75","approved_date":"2007-10-07 02:32:27"}]"#.to_string(),
        )
    })
    .await;

    let since = Cursor::parse("2007-10-06 23:59:59").unwrap();
    let records = client(server.url("/api")).fetch_page(since).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["beatmap_id"], "75");
    assert_eq!(
        server.requests(),
        vec!["/api/get_beatmaps?k=secret-key&since=2007-10-06+23%3A59%3A59&limit=500"]
    );
}

#[tokio::test]
async fn test_fetch_detail_query() {
    let server = LoopbackServer::start(|_| (200, r#"[{"pp":"727"},{"pp":"700"}]"#.to_string())).await;
    let client = client(server.url("/api/")).with_detail_query(DetailQuery {
        mode: GameMode::Taiko,
        limit: 100,
    });

    let records = client.fetch_detail(124493).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(
        server.requests(),
        vec!["/api/get_user_best?k=secret-key&u=124493&type=id&m=1&limit=100"]
    );
}

#[tokio::test]
async fn test_error_payload_is_fatal() {
    let server = LoopbackServer::start(|_| {
        (401, r#"{"error":"Please provide a valid API key."}"#.to_string())
    })
    .await;

    let err = client(server.url("/api")).fetch_detail(1).await.unwrap_err();
    assert!(matches!(&err, FetcherError::ApiError(msg) if msg.contains("valid API key")));
    assert!(err.is_fatal_service_error());
}

#[tokio::test]
async fn test_rate_limit_is_fatal() {
    let server = LoopbackServer::start(|_| (429, String::new())).await;
    let since = Cursor::parse("2007-10-07").unwrap();

    let err = client(server.url("/api")).fetch_page(since).await.unwrap_err();
    assert!(matches!(err, FetcherError::RateLimitExceeded));
}

#[tokio::test]
async fn test_malformed_bodies_are_transient() {
    let server = LoopbackServer::start(|target| {
        if target.contains("u=1&") {
            (200, "<html>cloudflare</html>".to_string())
        } else {
            (200, r#"{"user_id":"2"}"#.to_string())
        }
    })
    .await;
    let client = client(server.url("/api"));

    let err = client.fetch_detail(1).await.unwrap_err();
    assert!(matches!(err, FetcherError::ParseError(_)));
    assert!(!err.is_fatal_service_error());

    let err = client.fetch_detail(2).await.unwrap_err();
    assert!(matches!(err, FetcherError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_transport_error_hides_key() {
    // bind then drop to get a port nobody listens on
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let since = Cursor::parse("2007-10-07").unwrap();

    let err = client(format!("http://{addr}/api"))
        .fetch_page(since)
        .await
        .unwrap_err();

    assert!(matches!(&err, FetcherError::NetworkError(_)));
    assert!(!err.is_fatal_service_error());
    assert!(!err.to_string().contains(KEY));
}
