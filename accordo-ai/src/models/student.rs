//! Source student records and the flat rows derived from them

use crate::error::{PipelineError, PipelineResult};
use crate::models::value::AttributeValue;
use accordo_common::{schema, Quadrant};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// One entry of the source file's `students` array
///
/// Only the identity fields are checked up front; everything else is read
/// leniently from the retained JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentRecord {
    pub student_id: String,
    pub email: String,
    profile: Map<String, JsonValue>,
    source: Map<String, JsonValue>,
}

impl StudentRecord {
    /// Validate identity fields and wrap the record
    ///
    /// Fails with `MalformedRecord` when `studentId`, `profile`,
    /// `profile.email` or `profile.name` is absent or empty.
    pub fn from_json(value: JsonValue) -> PipelineResult<Self> {
        let JsonValue::Object(source) = value else {
            return Err(PipelineError::malformed("studentId"));
        };

        let student_id = non_empty_str(source.get("studentId"))
            .ok_or_else(|| PipelineError::malformed("studentId"))?
            .to_string();

        let profile = source
            .get("profile")
            .and_then(JsonValue::as_object)
            .cloned()
            .ok_or_else(|| PipelineError::malformed("profile"))?;

        let email = non_empty_str(profile.get("email"))
            .ok_or_else(|| PipelineError::malformed("profile.email"))?
            .to_string();

        match profile.get("name") {
            None | Some(JsonValue::Null) => return Err(PipelineError::malformed("profile.name")),
            Some(JsonValue::String(s)) if s.trim().is_empty() => {
                return Err(PipelineError::malformed("profile.name"))
            }
            Some(_) => {}
        }

        Ok(Self {
            student_id,
            email,
            profile,
            source,
        })
    }

    /// Best-effort student ID of a record that may not validate
    pub fn peek_student_id(value: &JsonValue) -> Option<String> {
        non_empty_str(value.get("studentId")).map(str::to_string)
    }

    pub fn profile_field(&self, key: &str) -> Option<&JsonValue> {
        self.profile.get(key).filter(|v| !v.is_null())
    }

    pub fn quadrant(&self, quadrant: Quadrant) -> Option<&JsonValue> {
        self.source.get(quadrant.key()).filter(|v| !v.is_null())
    }

    /// `"First Last"` from a structured name, or the name string itself
    pub fn display_name(&self) -> String {
        match self.profile.get("name") {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Object(name)) => ["first", "last"]
                .iter()
                .filter_map(|k| name.get(*k).and_then(JsonValue::as_str))
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        }
    }

    /// Profile stage, empty when absent
    pub fn stage(&self) -> &str {
        self.profile_field("stage")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    /// Recording URIs under `compositionalMusicianshipKnowledge.auralEvidenceRecordings`
    ///
    /// Non-string entries are skipped.
    pub fn aural_recordings(&self) -> Vec<&str> {
        self.quadrant(Quadrant::CompositionalMusicianshipKnowledge)
            .and_then(|q| q.get("auralEvidenceRecordings"))
            .and_then(JsonValue::as_array)
            .map(|items| items.iter().filter_map(JsonValue::as_str).collect())
            .unwrap_or_default()
    }
}

fn non_empty_str(value: Option<&JsonValue>) -> Option<&str> {
    value
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Row addressable by (partition key, sort key)
pub trait KeyedRow {
    fn partition_key(&self) -> &str;
    fn sort_key(&self) -> &str;
    fn attributes(&self) -> &BTreeMap<String, AttributeValue>;

    /// Full item: keys as `PK`/`SK` plus attributes, in store encoding
    fn to_item_json(&self) -> PipelineResult<JsonValue> {
        let mut item = Map::new();
        item.insert("PK".to_string(), serde_json::json!({ "S": self.partition_key() }));
        item.insert("SK".to_string(), serde_json::json!({ "S": self.sort_key() }));
        for (k, v) in self.attributes() {
            item.insert(k.clone(), v.to_store_json()?);
        }
        Ok(JsonValue::Object(item))
    }
}

/// `(STUDENT#<id>, PROFILE)` row
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRow {
    pub partition_key: String,
    pub sort_key: String,
    pub student_id: String,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl ProfileRow {
    pub fn new(student_id: &str, attributes: BTreeMap<String, AttributeValue>) -> Self {
        Self {
            partition_key: schema::student_partition_key(student_id),
            sort_key: schema::PROFILE_SORT_KEY.to_string(),
            student_id: student_id.to_string(),
            attributes,
        }
    }
}

impl KeyedRow for ProfileRow {
    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn sort_key(&self) -> &str {
        &self.sort_key
    }

    fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }
}

/// `(STUDENT#<id>, RECORDING#<timestamp>)` row
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingRow {
    pub partition_key: String,
    pub sort_key: String,
    pub recording_id: String,
    pub student_id: String,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl RecordingRow {
    pub fn new(
        student_id: &str,
        recording_id: &str,
        timestamp: &str,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Self {
        Self {
            partition_key: schema::student_partition_key(student_id),
            sort_key: schema::recording_sort_key(timestamp),
            recording_id: recording_id.to_string(),
            student_id: student_id.to_string(),
            attributes,
        }
    }
}

impl KeyedRow for RecordingRow {
    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn sort_key(&self) -> &str {
        &self.sort_key
    }

    fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }
}
