//! Export sink: serialize a batch and hand it to the object store
//!
//! Destination keys are deterministic. Snapshot endpoints overwrite
//! `{schema}/{endpoint}/{survey}.json.gz` on every run; incremental endpoints
//! write `{schema}/{endpoint}/{survey}_{marker}.json.gz` so that one run's
//! partition never clobbers another's.

pub mod transform;

use crate::error::{ExtractError, Result};
use crate::storage::ObjectStore;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::fmt;
use std::io::Write;
use surveysync_common::checksum::sha256_bytes;
use tracing::{info, instrument};

pub const FILE_EXTENSION: &str = "json.gz";

pub const CONTENT_TYPE: &str = "application/gzip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Survey,
    SurveyQuestion,
    SurveyCampaign,
    SurveyResponse,
    SurveyResponseDisqualified,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Survey => "survey",
            Endpoint::SurveyQuestion => "survey_question",
            Endpoint::SurveyCampaign => "survey_campaign",
            Endpoint::SurveyResponse => "survey_response",
            Endpoint::SurveyResponseDisqualified => "survey_response_disqualified",
        }
    }

    /// Time-partitioned endpoints carry a window marker in their file name
    pub fn is_incremental(&self) -> bool {
        matches!(
            self,
            Endpoint::SurveyResponse | Endpoint::SurveyResponseDisqualified
        )
    }

    /// Whether exported records get `survey_id` and the answer flattening
    pub fn is_transformed(&self) -> bool {
        !matches!(self, Endpoint::Survey)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Records of one endpoint for one survey, owned by the sink until uploaded
#[derive(Debug, Clone)]
pub struct ExportBatch {
    pub endpoint: Endpoint,
    pub resource_id: String,
    /// Window marker; required for incremental endpoints, ignored otherwise
    pub marker: Option<String>,
    pub records: Vec<Value>,
}

impl ExportBatch {
    pub fn snapshot(endpoint: Endpoint, resource_id: impl Into<String>, records: Vec<Value>) -> Self {
        Self {
            endpoint,
            resource_id: resource_id.into(),
            marker: None,
            records,
        }
    }

    pub fn partition(
        endpoint: Endpoint,
        resource_id: impl Into<String>,
        marker: impl Into<String>,
        records: Vec<Value>,
    ) -> Self {
        Self {
            endpoint,
            resource_id: resource_id.into(),
            marker: Some(marker.into()),
            records,
        }
    }

    /// `{endpoint}/{id}.json.gz` or `{endpoint}/{id}_{marker}.json.gz`
    pub fn file_name(&self) -> Result<String> {
        match (self.endpoint.is_incremental(), &self.marker) {
            (false, _) => Ok(format!(
                "{}/{}.{}",
                self.endpoint, self.resource_id, FILE_EXTENSION
            )),
            (true, Some(marker)) => Ok(format!(
                "{}/{}_{}.{}",
                self.endpoint, self.resource_id, marker, FILE_EXTENSION
            )),
            (true, None) => Err(ExtractError::storage(format!(
                "{} export for {} is missing its window marker",
                self.endpoint, self.resource_id
            ))),
        }
    }
}

/// Where an export landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLocation {
    pub key: String,
    pub url: String,
    pub records: usize,
    pub bytes: usize,
    pub sha256: String,
}

pub struct ExportSink<'a> {
    store: &'a dyn ObjectStore,
    schema: String,
}

impl<'a> ExportSink<'a> {
    pub fn new(store: &'a dyn ObjectStore, schema: impl Into<String>) -> Self {
        Self {
            store,
            schema: schema.into().trim_matches('/').to_string(),
        }
    }

    pub fn key_for(&self, batch: &ExportBatch) -> Result<String> {
        Ok(format!("{}/{}", self.schema, batch.file_name()?))
    }

    #[instrument(skip(self, batch), fields(endpoint = %batch.endpoint, survey_id = %batch.resource_id))]
    pub async fn export(&self, mut batch: ExportBatch) -> Result<ExportLocation> {
        let key = self.key_for(&batch)?;

        if batch.endpoint.is_transformed() {
            transform::prepare(&mut batch.records, &batch.resource_id);
        }
        let bytes = encode(&batch.records)?;
        let sha256 = sha256_bytes(&bytes);
        let size = bytes.len();

        let url = self.store.put(&key, bytes).await?;

        info!(
            key = %key,
            url = %url,
            records = batch.records.len(),
            bytes = size,
            "Exported batch"
        );

        Ok(ExportLocation {
            key,
            url,
            records: batch.records.len(),
            bytes: size,
            sha256,
        })
    }
}

/// Gzip-compressed UTF-8 JSON array. The gzip header carries no timestamp,
/// so equal records always encode to equal bytes.
pub fn encode(records: &[Value]) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(records)?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::io::Read;
    use tempfile::TempDir;

    fn decode(bytes: &[u8]) -> Value {
        let mut json = String::new();
        GzDecoder::new(bytes).read_to_string(&mut json).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_file_names() {
        let snapshot = ExportBatch::snapshot(Endpoint::SurveyQuestion, "42", vec![]);
        assert_eq!(snapshot.file_name().unwrap(), "survey_question/42.json.gz");

        let partition = ExportBatch::partition(Endpoint::SurveyResponse, "42", "1719810000", vec![]);
        assert_eq!(partition.file_name().unwrap(), "survey_response/42_1719810000.json.gz");

        let unmarked = ExportBatch::snapshot(Endpoint::SurveyResponseDisqualified, "42", vec![]);
        assert!(unmarked.file_name().is_err());
    }

    #[test]
    fn test_snapshot_ignores_marker() {
        let mut batch = ExportBatch::snapshot(Endpoint::Survey, "7", vec![]);
        batch.marker = Some("123".into());
        assert_eq!(batch.file_name().unwrap(), "survey/7.json.gz");
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let records = vec![json!({"id": "1", "b": 2, "a": 1}), json!({"id": "2"})];
        let first = encode(&records).unwrap();
        let second = encode(&records.clone()).unwrap();
        assert_eq!(first, second);
        assert_eq!(decode(&first), Value::Array(records));
    }

    #[tokio::test]
    async fn test_export_writes_transformed_records() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let sink = ExportSink::new(&store, "surveygizmo");

        let batch = ExportBatch::partition(
            Endpoint::SurveyResponse,
            "42",
            "0",
            vec![json!({"id": "1", "survey_data": {"3": {"id": 3}}})],
        );
        let location = sink.export(batch).await.unwrap();

        assert_eq!(location.key, "surveygizmo/survey_response/42_0.json.gz");
        assert_eq!(location.records, 1);
        assert!(location.url.starts_with("file://"));

        let bytes = std::fs::read(dir.path().join(&location.key)).unwrap();
        assert_eq!(sha256_bytes(&bytes), location.sha256);
        let written = decode(&bytes);
        assert_eq!(written[0]["survey_id"], "42");
        assert_eq!(written[0]["survey_data_list"], json!([{"id": 3}]));
    }

    #[tokio::test]
    async fn test_reexport_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let sink = ExportSink::new(&store, "surveygizmo/");
        let records = vec![json!({"id": "1", "title": "Q"})];

        let first = sink
            .export(ExportBatch::snapshot(Endpoint::SurveyQuestion, "42", records.clone()))
            .await
            .unwrap();
        let before = std::fs::read(dir.path().join(&first.key)).unwrap();
        let second = sink
            .export(ExportBatch::snapshot(Endpoint::SurveyQuestion, "42", records))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(dir.path().join(&second.key)).unwrap(), before);
    }

    #[tokio::test]
    async fn test_survey_snapshot_is_not_tagged() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let sink = ExportSink::new(&store, "s");

        let location = sink
            .export(ExportBatch::snapshot(Endpoint::Survey, "7", vec![json!({"id": "7"})]))
            .await
            .unwrap();
        let written = decode(&std::fs::read(dir.path().join(location.key)).unwrap());
        assert!(written[0].get("survey_id").is_none());
    }
}
