//! Response envelope and typed records
//!
//! Records are hydrated field-by-field from the parsed JSON. The remote API
//! is loose about scalar types (ids and counts arrive as numbers or strings),
//! so the accessors here accept both.

use crate::error::{ExtractError, Result};
use crate::window::parse_timestamp;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One page of a list call, with `data` normalized to a list
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub page: Option<u32>,
    pub total_pages: Option<u32>,
    pub total_count: Option<u64>,
    pub records: Vec<Value>,
}

impl Page {
    /// Parse the `{result_ok, page, total_pages, data, ...}` envelope.
    ///
    /// `data` may be a single object or a list; both become a list.
    /// `result_ok: false` is reported as an API error.
    pub fn from_envelope(envelope: Value) -> Result<Self> {
        let Value::Object(mut obj) = envelope else {
            return Err(ExtractError::record("response envelope is not a JSON object"));
        };

        if obj.get("result_ok").and_then(Value::as_bool) == Some(false) {
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("result_ok=false without message")
                .to_string();
            return Err(ExtractError::api(200, message));
        }

        let records = match obj.remove("data") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(item @ Value::Object(_)) => vec![item],
            Some(other) => {
                return Err(ExtractError::record(format!(
                    "envelope data is neither an object nor a list: {}",
                    other
                )))
            },
        };

        Ok(Self {
            page: obj.get("page").and_then(lenient_u64).map(clamp_u32),
            total_pages: obj.get("total_pages").and_then(lenient_u64).map(clamp_u32),
            total_count: obj.get("total_count").and_then(lenient_u64),
            records,
        })
    }
}

/// Survey lifecycle state as reported by the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurveyStatus {
    Active,
    Archived,
    Other(String),
}

impl SurveyStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "Active" => SurveyStatus::Active,
            "Archived" => SurveyStatus::Archived,
            other => SurveyStatus::Other(other.to_string()),
        }
    }

    pub fn is_archived(&self) -> bool {
        matches!(self, SurveyStatus::Archived)
    }
}

/// Outcome label -> response count
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics(BTreeMap<String, u64>);

impl Statistics {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self(
            obj.iter()
                .filter_map(|(label, count)| lenient_u64(count).map(|c| (label.clone(), c)))
                .collect(),
        ))
    }

    /// Sum over every outcome label
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn count(&self, label: &str) -> u64 {
        self.0.get(label).copied().unwrap_or(0)
    }
}

impl<const N: usize> From<[(&str, u64); N]> for Statistics {
    fn from(entries: [(&str, u64); N]) -> Self {
        Self(entries.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }
}

/// A survey as listed or fetched from the source
#[derive(Debug, Clone, PartialEq)]
pub struct Survey {
    pub id: String,
    pub title: String,
    pub status: SurveyStatus,
    /// Missing on some legacy surveys; such surveys are never skipped
    pub modified_on: Option<DateTime<FixedOffset>>,
    pub statistics: Option<Statistics>,
    /// The full source object, exported as-is for the snapshot endpoint
    pub raw: Value,
}

impl Survey {
    /// Hydrate from a raw record; timestamps without an offset are read in `tz`.
    pub fn from_value(raw: Value, tz: FixedOffset) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| ExtractError::record("survey record is not a JSON object"))?;

        let id = field_string(obj, "id")
            .ok_or_else(|| ExtractError::record("survey record has no id"))?;

        let modified_on = match obj.get("modified_on").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => Some(parse_timestamp(s, tz)?),
            _ => None,
        };

        Ok(Self {
            title: field_string(obj, "title").unwrap_or_default(),
            status: SurveyStatus::parse(obj.get("status").and_then(Value::as_str).unwrap_or("")),
            modified_on,
            statistics: obj.get("statistics").and_then(Statistics::from_value),
            id,
            raw,
        })
    }
}

/// An answer option of a survey question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOption {
    pub id: String,
    pub title: String,
    pub value: String,
}

impl QuestionOption {
    pub fn from_value(raw: &Value) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| ExtractError::record("option record is not a JSON object"))?;

        Ok(Self {
            id: field_string(obj, "id")
                .ok_or_else(|| ExtractError::record("option record has no id"))?,
            title: field_string(obj, "title").unwrap_or_default(),
            value: field_string(obj, "value").unwrap_or_default(),
        })
    }
}

/// The `id` of a raw record, when it has a readable one
pub fn record_id(raw: &Value) -> Option<String> {
    field_string(raw.as_object()?, "id")
}

/// String or number field rendered as a string
fn field_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn clamp_u32(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
