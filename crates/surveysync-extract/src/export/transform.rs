//! Record transforms applied before export
//!
//! All transforms are total: a record that lacks the field being reshaped
//! passes through untouched.

use serde_json::{Map, Value};

pub const RESOURCE_ID_FIELD: &str = "survey_id";

/// Tag every record with the id of the survey it belongs to
pub fn tag_resource_id(records: &mut [Value], resource_id: &str) {
    for record in records.iter_mut() {
        if let Value::Object(map) = record {
            map.insert(
                RESOURCE_ID_FIELD.to_string(),
                Value::String(resource_id.to_string()),
            );
        }
    }
}

/// `survey_data` is keyed by question id; downstream wants a list.
///
/// The list is stored alongside as `survey_data_list`, in source order. A
/// `survey_data` that is already a list is copied as is.
pub fn flatten_survey_data(record: &mut Value) {
    let Value::Object(map) = record else {
        return;
    };
    let list = match map.get("survey_data") {
        Some(Value::Object(answers)) => Value::Array(answers.values().cloned().collect()),
        Some(Value::Array(answers)) => Value::Array(answers.clone()),
        _ => return,
    };
    map.insert("survey_data_list".to_string(), list);
}

/// Inside each answer of `survey_data_list`, copy the `options` mapping into
/// an `options_list`
pub fn flatten_options(record: &mut Value) {
    let Some(Value::Array(answers)) = record.get_mut("survey_data_list") else {
        return;
    };
    for answer in answers.iter_mut().filter_map(Value::as_object_mut) {
        if let Some(list) = options_list(answer) {
            answer.insert("options_list".to_string(), list);
        }
    }
}

fn options_list(answer: &Map<String, Value>) -> Option<Value> {
    match answer.get("options") {
        Some(Value::Object(options)) if !options.is_empty() => {
            Some(Value::Array(options.values().cloned().collect()))
        },
        _ => None,
    }
}

/// The full transform chain for one exported batch
pub fn prepare(records: &mut [Value], resource_id: &str) {
    tag_resource_id(records, resource_id);
    for record in records.iter_mut() {
        flatten_survey_data(record);
        flatten_options(record);
    }
}
