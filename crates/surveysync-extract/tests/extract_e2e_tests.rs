//! End-to-end extraction against a mock survey API
//!
//! These drive the real `ApiClient` over HTTP (wiremock) and write exports
//! into a `LocalStore` inside a temp directory.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use flate2::read::GzDecoder;
use serde_json::{json, Value};
use std::io::Read;
use std::path::Path;
use surveysync_common::checksum::verify_file;
use surveysync_extract::api::ApiClient;
use surveysync_extract::checkpoint::CheckpointStore;
use surveysync_extract::config::ApiConfig;
use surveysync_extract::export::ExportSink;
use surveysync_extract::paginator::PagingPolicy;
use surveysync_extract::skip::SkipReason;
use surveysync_extract::storage::LocalStore;
use surveysync_extract::window::{parse_timestamp, WindowCalculator};
use surveysync_extract::{ExtractError, Extractor};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn est() -> FixedOffset {
    FixedOffset::west_opt(5 * 3600).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0).unwrap()
}

fn envelope(page: u32, total_pages: u32, data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "result_ok": true,
        "page": page,
        "total_pages": total_pages,
        "data": data
    }))
}

fn responses(range: std::ops::Range<u32>) -> Value {
    Value::Array(
        range
            .map(|n| {
                json!({
                    "id": n.to_string(),
                    "status": "Complete",
                    "survey_data": {"2": {"id": 2, "answer": format!("answer {n}")}}
                })
            })
            .collect(),
    )
}

fn read_export(root: &Path, key: &str) -> Value {
    let bytes = std::fs::read(root.join(key)).unwrap();
    let mut json = String::new();
    GzDecoder::new(bytes.as_slice()).read_to_string(&mut json).unwrap();
    serde_json::from_str(&json).unwrap()
}

struct Harness {
    server: MockServer,
    dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            dir: TempDir::new().unwrap(),
        }
    }

    fn client(&self) -> ApiClient {
        ApiClient::new(&ApiConfig::new(self.server.uri(), "token", "secret")).unwrap()
    }

    fn state_file(&self) -> std::path::PathBuf {
        self.dir.path().join("state.json")
    }

    fn store(&self) -> LocalStore {
        LocalStore::new(self.dir.path().join("exports"))
    }
}

async fn mount_survey_42(server: &MockServer) {
    let survey = json!({
        "id": "42",
        "title": "Exit interview",
        "status": "Active",
        "modified_on": "2024-09-30 10:00:00",
        "statistics": {"Complete": 8}
    });

    Mock::given(method("GET"))
        .and(path("/v5/survey/42"))
        .respond_with(envelope(1, 1, survey))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v5/survey/42/surveyquestion"))
        .respond_with(envelope(1, 1, json!([{"id": 2, "title": {"English": "How was it?"}}])))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v5/survey/42/surveycampaign"))
        .respond_with(envelope(1, 1, json!([])))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v5/survey/42/surveyresponse"))
        .and(query_param("page", "1"))
        .and(query_param("filter[field][0]", "date_submitted"))
        .and(query_param("filter[operator][0]", ">="))
        .and(query_param("filter[value][0]", "1969-12-31 19:00:00 -05:00"))
        .and(query_param("filter[operator][1]", "<"))
        .and(query_param("filter[value][1]", "2024-10-01 06:00:00 -05:00"))
        .respond_with(envelope(1, 2, responses(0..5)))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v5/survey/42/surveyresponse"))
        .and(query_param("page", "2"))
        .respond_with(envelope(2, 2, responses(5..8)))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_archived_survey_7(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/v5/survey/7(/.*)?$"))
        .respond_with(envelope(1, 1, json!([])))
        .expect(0)
        .mount(server)
        .await;
}

fn listing() -> Value {
    json!([
        {
            "id": "42",
            "title": "Exit interview",
            "status": "Active",
            "modified_on": "2024-09-30 10:00:00",
            "statistics": {"Complete": 8}
        },
        {
            "id": 7,
            "title": "Old survey",
            "status": "Archived",
            "modified_on": "2024-04-01 09:00:00",
            "statistics": {"Complete": 120}
        }
    ])
}

#[tokio::test]
async fn test_active_survey_is_extracted_and_archived_survey_skipped() {
    let harness = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/survey"))
        .and(query_param("page", "1"))
        .respond_with(envelope(1, 1, listing()))
        .expect(1)
        .mount(&harness.server)
        .await;
    mount_survey_42(&harness.server).await;
    mount_archived_survey_7(&harness.server).await;

    let bookmark_7 = parse_timestamp("2024-09-01 12:00:00", est()).unwrap();
    {
        let mut seed = CheckpointStore::load(harness.state_file(), est()).unwrap();
        seed.commit("7", bookmark_7);
        seed.flush().unwrap();
    }

    let client = harness.client();
    let store = harness.store();
    let mut checkpoint = CheckpointStore::load(harness.state_file(), est()).unwrap();
    let windows = WindowCalculator::new(est(), TimeDelta::hours(1));

    let report = Extractor::new(&client, ExportSink::new(&store, "surveygizmo"), &mut checkpoint, windows, 2024)
        .run(now())
        .await
        .unwrap();

    assert_eq!(report.listed, 2);
    assert_eq!(report.extracted, vec!["42".to_string()]);
    assert_eq!(report.skipped, vec![("7".to_string(), SkipReason::ArchivedUnmodified)]);
    assert!(report.is_clean());

    let exported = read_export(store.root(), "surveygizmo/survey_response/42_0.json.gz");
    let records = exported.as_array().unwrap();
    assert_eq!(records.len(), 8);
    assert!(records.iter().all(|r| r["survey_id"] == "42"));
    let ids: Vec<_> = records.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["0", "1", "2", "3", "4", "5", "6", "7"]);
    assert_eq!(records[0]["survey_data_list"][0]["answer"], "answer 0");

    for location in &report.exports {
        verify_file(store.root().join(&location.key), &location.sha256).unwrap();
    }

    let snapshot = read_export(store.root(), "surveygizmo/survey/42.json.gz");
    assert_eq!(snapshot[0]["title"], "Exit interview");
    let campaigns = read_export(store.root(), "surveygizmo/survey_campaign/42.json.gz");
    assert_eq!(campaigns, json!([]));

    let expected_end = (now() - TimeDelta::hours(1)).with_timezone(&est());
    let reloaded = CheckpointStore::load(harness.state_file(), est()).unwrap();
    assert_eq!(reloaded.get("42"), Some(expected_end));
    assert_eq!(reloaded.get("7"), Some(bookmark_7));
}

#[tokio::test]
async fn test_failed_survey_keeps_bookmark_and_run_continues() {
    let harness = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/survey"))
        .respond_with(envelope(
            1,
            1,
            json!([
                {"id": "13", "status": "Active", "statistics": {"Complete": 1}},
                {"id": "42", "status": "Active", "statistics": {"Complete": 8}}
            ]),
        ))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v5/survey/13"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&harness.server)
        .await;
    mount_survey_42(&harness.server).await;

    let client = harness.client();
    let store = harness.store();
    let mut checkpoint = CheckpointStore::load(harness.state_file(), est()).unwrap();
    let windows = WindowCalculator::new(est(), TimeDelta::hours(1));

    let report = Extractor::new(&client, ExportSink::new(&store, "surveygizmo"), &mut checkpoint, windows, 2024)
        .run(now())
        .await
        .unwrap();

    assert_eq!(report.extracted, vec!["42".to_string()]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].survey_id, "13");
    assert!(matches!(report.failures[0].error, ExtractError::Api { status: 502, .. }));

    let reloaded = CheckpointStore::load(harness.state_file(), est()).unwrap();
    assert_eq!(reloaded.get("13"), None);
    assert!(reloaded.get("42").is_some());
}

#[tokio::test]
async fn test_short_page_triggers_one_degraded_restart() {
    let harness = Harness::start().await;
    // With 4 per page the source hands back a short, non-final first page.
    Mock::given(method("GET"))
        .and(path("/v5/survey"))
        .and(query_param("resultsperpage", "4"))
        .respond_with(envelope(1, 2, json!([{"id": "1", "status": "Archived", "modified_on": "2020-01-01 00:00:00"}])))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v5/survey"))
        .and(query_param("resultsperpage", "2"))
        .and(query_param("page", "1"))
        .respond_with(envelope(1, 1, json!([{"id": "1", "status": "Archived", "modified_on": "2020-01-01 00:00:00"}])))
        .expect(1)
        .mount(&harness.server)
        .await;

    let client = harness.client();
    let store = harness.store();
    let mut checkpoint = CheckpointStore::load(harness.state_file(), est()).unwrap();
    checkpoint.commit("1", parse_timestamp("2024-01-01 00:00:00", est()).unwrap());
    let windows = WindowCalculator::new(est(), TimeDelta::hours(1));

    let report = Extractor::new(&client, ExportSink::new(&store, "surveygizmo"), &mut checkpoint, windows, 2024)
        .with_paging(PagingPolicy::with_page_size(4))
        .run(now())
        .await
        .unwrap();

    assert_eq!(report.listed, 1);
    assert_eq!(report.skipped.len(), 1);
}

#[tokio::test]
async fn test_corrupt_checkpoint_refuses_to_start() {
    let harness = Harness::start().await;
    std::fs::write(harness.state_file(), "{\"bookmarks\": ").unwrap();

    let err = CheckpointStore::load(harness.state_file(), est()).unwrap_err();
    assert!(matches!(err, ExtractError::CheckpointCorrupt { .. }));
    assert!(err.is_fatal());
}
