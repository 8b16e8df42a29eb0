//! End-to-end cycles over a mock feed, a temporary local store and
//! in-memory tables

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tubeline_ingest::bronze::ArchiveOutcome;
use tubeline_ingest::config::PipelineConfig;
use tubeline_ingest::error::{FetchError, PipelineError, RecordError, SchemaError};
use tubeline_ingest::models::PromotionStatus;
use tubeline_ingest::storage::{ArtifactStore, LocalArtifactStore};
use tubeline_ingest::tables::{BronzeTable, MemoryBronzeTable, MemorySilverTable, SilverTable};
use tubeline_ingest::Pipeline;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED_PATH: &str = "/line/mode/tube/status";
const STAGING: &str = "/FileStore/TFL/staging";
const ARCHIVE: &str = "/FileStore/TFL/archive";

struct Harness {
    dir: TempDir,
    server: MockServer,
    store: Arc<LocalArtifactStore>,
    bronze: Arc<MemoryBronzeTable>,
    silver: Arc<MemorySilverTable>,
    pipeline: Pipeline,
}

async fn harness() -> Harness {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("temp dir");

    let store = Arc::new(LocalArtifactStore::new(dir.path()));
    let bronze = Arc::new(MemoryBronzeTable::new());
    let silver = Arc::new(MemorySilverTable::new());

    let config = PipelineConfig {
        feed_url: format!("{}{}", server.uri(), FEED_PATH),
        staging_dir: STAGING.to_string(),
        archive_dir: ARCHIVE.to_string(),
        fetch_attempts: 3,
        fetch_backoff_secs: 0,
        fetch_timeout_secs: 5,
        ..PipelineConfig::default()
    };

    let pipeline = Pipeline::new(config, store.clone(), bronze.clone(), silver.clone())
        .expect("pipeline should build");

    Harness {
        dir,
        server,
        store,
        bronze,
        silver,
        pipeline,
    }
}

impl Harness {
    async fn serve(&self, body: Value) {
        Mock::given(method("GET"))
            .and(path(FEED_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}

fn line(id: &str, line_statuses: Value) -> Value {
    json!({
        "$type": "Tfl.Api.Presentation.Entities.Line, Tfl.Api.Presentation.Entities",
        "id": id,
        "name": id,
        "modeName": "tube",
        "disruptions": [],
        "created": "2024-01-16T16:43:14.59Z",
        "modified": "2024-01-16T16:43:14.59Z",
        "lineStatuses": line_statuses,
        "routeSections": [],
        "serviceTypes": [{"name": "Regular", "uri": format!("/Line/Route?ids={id}&serviceTypes=Regular")}],
        "crowding": {}
    })
}

#[tokio::test]
async fn test_victoria_good_service_end_to_end() {
    let h = harness().await;
    h.serve(json!([line(
        "victoria",
        json!([{"lineId": "victoria", "statusSeverity": 10, "statusSeverityDescription": "Good Service"}])
    )]))
    .await;

    let report = h.pipeline.run_cycle().await.expect("cycle should succeed");

    assert_eq!(report.raw_records, 1);
    assert_eq!(report.promotion.transform.records_selected, 1);
    assert_eq!(report.promotion.transform.rows_written, 1);
    assert_eq!(report.promotion.promoted_count, 1);
    assert!(report.promotion.transform.skipped.is_empty());
    assert!(report.completion_message().starts_with("The pipeline cycle completed successfully"));

    let raw = h.bronze.rows().await;
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].line.id.as_deref(), Some("victoria"));
    assert_eq!(raw[0].promotion_status, PromotionStatus::Promoted);

    let silver = h.silver.rows().await;
    assert_eq!(silver.len(), 1);
    let row = &silver[0];
    assert_eq!(row.identity_key, raw[0].identity_key);
    assert_eq!(row.line.as_deref(), Some("victoria"));
    assert_eq!(row.status_severity, Some(10));
    assert_eq!(row.status_severity_description.as_deref(), Some("Good Service"));
    assert_eq!(row.disruption_reason, None);
    assert_eq!(row.observation_timestamp, raw[0].created_timestamp);

    // Promoted records are never selected again.
    let rerun = h.pipeline.run_transform().await.expect("transform should succeed");
    assert_eq!(rerun.transform.records_selected, 0);
    assert_eq!(rerun.transform.rows_written, 0);
    assert_eq!(rerun.promoted_count, 0);
    assert_eq!(h.silver.count().await.expect("count"), 1);
}

#[tokio::test]
async fn test_staged_payload_is_archived_under_same_name() {
    let h = harness().await;
    h.serve(json!([line("central", json!([]))])).await;

    let report = h.pipeline.run_cycle().await.expect("cycle should succeed");

    let ArchiveOutcome::Archived(archived) = &report.archive else {
        panic!("payload should be archived, got {:?}", report.archive);
    };
    assert_eq!(archived.file_name(), report.staging_key.file_name());
    assert_eq!(archived.file_name(), report.cycle.staging_name());

    assert!(h.store.list(STAGING).await.expect("list staging").is_empty());
    assert_eq!(h.store.list(ARCHIVE).await.expect("list archive"), vec![archived.clone()]);
}

#[tokio::test]
async fn test_fan_out_and_line_coalesce() {
    let h = harness().await;
    h.serve(json!([
        line(
            "district",
            json!([
                {"lineId": "district", "statusSeverity": 9, "statusSeverityDescription": "Minor Delays",
                 "reason": "Minor delays between Earl's Court and Wimbledon"},
                {"statusSeverity": 10, "statusSeverityDescription": "Good Service"},
                {"lineId": "wimbledon-branch", "statusSeverity": "6", "statusSeverityDescription": "Severe Delays"}
            ])
        ),
        line("central", json!([]))
    ]))
    .await;

    let report = h.pipeline.run_cycle().await.expect("cycle should succeed");

    assert_eq!(report.raw_records, 2);
    assert_eq!(report.promotion.transform.rows_written, 3);
    // The record without status entries is still promoted.
    assert_eq!(report.promotion.promoted_count, 2);

    let district_key = h.bronze.rows().await[0].identity_key;
    let silver = h.silver.rows().await;
    assert!(silver.iter().all(|row| row.identity_key == district_key));

    let lines: Vec<Option<&str>> = silver.iter().map(|row| row.line.as_deref()).collect();
    assert_eq!(lines, vec![Some("district"), Some("district"), Some("wimbledon-branch")]);

    let severities: Vec<Option<i32>> = silver.iter().map(|row| row.status_severity).collect();
    assert_eq!(severities, vec![Some(9), Some(10), Some(6)]);
    assert_eq!(
        silver[0].disruption_reason.as_deref(),
        Some("Minor delays between Earl's Court and Wimbledon")
    );
    assert!(h.bronze.unpromoted().await.expect("unpromoted").is_empty());
}

#[tokio::test]
async fn test_fetch_exhaustion_aborts_before_any_write() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&h.server)
        .await;

    let err = h.pipeline.run_cycle().await.expect_err("cycle should fail");

    assert!(matches!(
        err,
        PipelineError::Fetch(FetchError::Exhausted { attempts: 3, .. })
    ));
    assert!(h.store.list(STAGING).await.expect("list staging").is_empty());
    assert_eq!(h.bronze.count().await.expect("count"), 0);
    assert_eq!(h.silver.count().await.expect("count"), 0);
}

#[tokio::test]
async fn test_top_level_schema_failure_commits_nothing() {
    let h = harness().await;
    h.serve(json!("tube status unavailable")).await;

    let err = h.pipeline.run_cycle().await.expect_err("cycle should fail");

    assert!(matches!(
        err,
        PipelineError::Schema(SchemaError::TopLevel { found: "string" })
    ));
    assert_eq!(h.bronze.count().await.expect("count"), 0);
    // The payload stays in staging for inspection.
    assert_eq!(h.store.list(STAGING).await.expect("list staging").len(), 1);
    assert!(h.store.list(ARCHIVE).await.expect("list archive").is_empty());
}

#[tokio::test]
async fn test_bad_records_are_skipped_and_retried() {
    let h = harness().await;
    h.serve(json!([
        line("jubilee", json!("not a status list")),
        line("northern", json!([{"lineId": "northern", "statusSeverity": "unknown"}])),
        line("piccadilly", json!([{"lineId": "piccadilly", "statusSeverity": 10}]))
    ]))
    .await;

    let report = h.pipeline.run_cycle().await.expect("record errors are not fatal");
    let transform = &report.promotion.transform;

    assert_eq!(transform.records_selected, 3);
    assert_eq!(transform.rows_written, 1);
    assert_eq!(report.promotion.promoted_count, 1);

    let raw = h.bronze.rows().await;
    let (jubilee, northern, piccadilly) = (raw[0].identity_key, raw[1].identity_key, raw[2].identity_key);
    assert_eq!(transform.transformed_keys, vec![piccadilly]);
    assert_eq!(transform.skipped_keys(), vec![jubilee, northern]);
    assert!(matches!(transform.skipped[0].error, RecordError::Decode(_)));
    assert!(matches!(
        transform.skipped[1].error,
        RecordError::Schema(SchemaError::Cast { .. })
    ));

    // Skipped records stay unpromoted and are selected again.
    let retry = h.pipeline.run_transform().await.expect("transform should succeed");
    assert_eq!(retry.transform.records_selected, 2);
    assert_eq!(retry.transform.skipped_keys(), vec![jubilee, northern]);
    assert_eq!(retry.promoted_count, 0);
    assert_eq!(h.silver.count().await.expect("count"), 1);
}

#[tokio::test]
async fn test_missing_severity_is_written_and_promoted() {
    let h = harness().await;
    h.serve(json!([line(
        "victoria",
        json!([{"lineId": "victoria", "statusSeverityDescription": "Good Service"}])
    )]))
    .await;

    let report = h.pipeline.run_cycle().await.expect("cycle should succeed");

    assert!(report.promotion.transform.skipped.is_empty());
    assert_eq!(report.promotion.promoted_count, 1);

    let silver = h.silver.rows().await;
    assert_eq!(silver.len(), 1);
    assert_eq!(silver[0].status_severity, None);
    assert_eq!(silver[0].status_severity_description.as_deref(), Some("Good Service"));
    assert!(h.bronze.unpromoted().await.expect("unpromoted").is_empty());
}

#[tokio::test]
async fn test_relocation_failure_is_reported_not_fatal() {
    let h = harness().await;
    h.serve(json!([line("circle", json!([{"lineId": "circle", "statusSeverity": 10}]))]))
        .await;

    // A regular file where the archive directory should be.
    let archive_path = h.dir.path().join(ARCHIVE.trim_start_matches('/'));
    std::fs::create_dir_all(archive_path.parent().expect("archive parent")).expect("mkdir");
    std::fs::write(&archive_path, b"not a directory").expect("blocker file");

    let report = h.pipeline.run_cycle().await.expect("relocation failure is not fatal");

    let ArchiveOutcome::RelocationFailed(failure) = &report.archive else {
        panic!("relocation should fail, got {:?}", report.archive);
    };
    assert_eq!(failure.from, report.staging_key);
    assert!(report.completion_message().contains("manual reconciliation"));

    // Raw data is durable and the transform still ran.
    assert_eq!(report.raw_records, 1);
    assert_eq!(report.promotion.promoted_count, 1);
    assert_eq!(h.store.list(STAGING).await.expect("list staging"), vec![report.staging_key.clone()]);
}

#[tokio::test]
async fn test_consecutive_cycles_only_promote_new_records() {
    let h = harness().await;
    h.serve(json!([line("bakerloo", json!([{"lineId": "bakerloo", "statusSeverity": 10}]))]))
        .await;

    let first = h.pipeline.run_cycle().await.expect("first cycle");
    let second = h.pipeline.run_cycle().await.expect("second cycle");

    assert_ne!(first.staging_key, second.staging_key);
    assert_eq!(first.promotion.transform.records_selected, 1);
    assert_eq!(second.promotion.transform.records_selected, 1);
    assert_eq!(h.silver.count().await.expect("count"), 2);
    assert_eq!(h.store.list(ARCHIVE).await.expect("list archive").len(), 2);

    let keys: Vec<i64> = h.silver.rows().await.iter().map(|row| row.identity_key).collect();
    assert_eq!(keys, vec![1, 2]);

    let latest = h.pipeline.preview(5).await.expect("preview");
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].identity_key, 2);
}
