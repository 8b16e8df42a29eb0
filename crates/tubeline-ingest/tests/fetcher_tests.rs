//! Fetcher retry tests against a mock feed

use std::time::{Duration, Instant};
use tempfile::TempDir;
use tubeline_common::types::CycleTimestamp;
use tubeline_ingest::error::{AttemptError, FetchError, PipelineError};
use tubeline_ingest::fetcher::{FetchConfig, Fetcher};
use tubeline_ingest::storage::{ArtifactStore, LocalArtifactStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED_PATH: &str = "/line/mode/tube/status";
const STAGING: &str = "/FileStore/TFL/staging";

fn fetcher(server: &MockServer, max_attempts: u32) -> Fetcher {
    fetcher_with_backoff(server, max_attempts, Duration::ZERO)
}

fn fetcher_with_backoff(server: &MockServer, max_attempts: u32, backoff: Duration) -> Fetcher {
    Fetcher::new(FetchConfig {
        url: format!("{}{}", server.uri(), FEED_PATH),
        max_attempts,
        backoff,
        timeout: Duration::from_secs(5),
    })
    .expect("fetcher should build")
}

#[tokio::test]
async fn test_fail_twice_then_succeed_makes_three_calls() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .with_priority(2)
        .mount(&server)
        .await;

    let payload = fetcher(&server, 3).fetch().await.expect("third attempt should succeed");

    assert_eq!(payload, b"[]");
    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_first_success_stops_retrying() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    fetcher(&server, 3).fetch().await.expect("fetch should succeed");
}

#[tokio::test]
async fn test_always_failing_feed_stages_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let store = LocalArtifactStore::new(dir.path());

    let err = fetcher(&server, 3)
        .fetch_to_staging(&store, STAGING, CycleTimestamp::now())
        .await
        .expect_err("fetch should be exhausted");

    match err {
        PipelineError::Fetch(FetchError::Exhausted { attempts, last, .. }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(last, AttemptError::Status(status) if status.as_u16() == 500));
        }
        other => panic!("expected fetch exhaustion, got {other}"),
    }

    assert!(store.list(STAGING).await.expect("list staging").is_empty());
}

#[tokio::test]
async fn test_failed_attempts_wait_the_fixed_backoff() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let backoff = Duration::from_millis(200);
    let start = Instant::now();

    let err = fetcher_with_backoff(&server, 3, backoff)
        .fetch()
        .await
        .expect_err("fetch should be exhausted");

    assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
    assert!(start.elapsed() >= backoff * 2);
}

#[tokio::test]
async fn test_successful_fetch_stages_one_timestamped_artifact() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id":"victoria"}]"#))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let store = LocalArtifactStore::new(dir.path());
    let cycle = CycleTimestamp::now();

    let key = fetcher(&server, 3)
        .fetch_to_staging(&store, STAGING, cycle)
        .await
        .expect("fetch should stage payload");

    assert_eq!(key.as_str(), format!("{}/{}", STAGING, cycle.staging_name()));
    assert_eq!(store.list(STAGING).await.expect("list staging"), vec![key.clone()]);
    assert_eq!(store.read(&key).await.expect("read staged"), br#"[{"id":"victoria"}]"#);
}
