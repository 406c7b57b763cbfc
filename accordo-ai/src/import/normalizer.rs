//! Source record → store rows
//!
//! One [`ProfileRow`] and zero or more [`RecordingRow`]s per student, all in
//! the student's partition. Every float in carried attributes becomes an
//! exact decimal; timestamps are stamped at normalization time.

use crate::error::PipelineResult;
use crate::models::value::normalize_json;
use crate::models::{AttributeValue, ProfileRow, RecordingRow, StudentRecord};
use accordo_common::time::to_row_timestamp;
use accordo_common::Quadrant;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

const RECORDING_FILE_SIZE: i64 = 512_000;
const RECORDING_DURATION_SECS: i64 = 30;
const DEFAULT_FORMAT: &str = "mp3";
const AURAL_PIECE: &str = "Aural Skills Exercise";
const AURAL_COMPOSER: &str = "N/A";
const AURAL_PERFORMANCE_TYPE: &str = "Aural Evidence";
const RECORDING_STATUS: &str = "completed";

/// Profile fields copied as scalars; absent ones become `""`
const PROFILE_SCALARS: [&str; 8] = [
    "name",
    "age",
    "stage",
    "programme",
    "instrument",
    "faculty",
    "teacher",
    "enrollmentDate",
];

/// Derives store rows from source records
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    bucket: String,
}

impl RecordNormalizer {
    /// `bucket` is the object bucket recording URIs point into
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Profile row keyed `(STUDENT#<id>, PROFILE)`
    ///
    /// Fails with `TypeConversion` when a carried number cannot become a
    /// decimal.
    pub fn normalize_profile(
        &self,
        record: &StudentRecord,
        now: DateTime<Utc>,
    ) -> PipelineResult<ProfileRow> {
        let stamp = AttributeValue::text(to_row_timestamp(now));
        let mut attrs = BTreeMap::new();

        attrs.insert("studentId".to_string(), AttributeValue::text(&record.student_id));
        attrs.insert("email".to_string(), AttributeValue::text(&record.email));

        for key in PROFILE_SCALARS {
            let value = match record.profile_field(key) {
                Some(v) => normalize_json(v)?,
                None => AttributeValue::text(""),
            };
            attrs.insert(key.to_string(), value);
        }

        let pieces = match record.profile_field("piecesInProgress") {
            Some(v) => normalize_json(v)?,
            None => AttributeValue::List(Vec::new()),
        };
        attrs.insert("piecesInProgress".to_string(), pieces);

        for quadrant in Quadrant::ALL {
            let value = match record.quadrant(quadrant) {
                Some(v) => normalize_json(v)?,
                None => AttributeValue::Map(BTreeMap::new()),
            };
            attrs.insert(quadrant.key().to_string(), value);
        }

        attrs.insert(
            "totalRecordings".to_string(),
            AttributeValue::Integer(record.aural_recordings().len() as i64),
        );
        attrs.insert("totalFeedbackReceived".to_string(), AttributeValue::Integer(0));
        attrs.insert("lastAssessmentDate".to_string(), stamp.clone());
        attrs.insert("createdAt".to_string(), stamp.clone());
        attrs.insert("updatedAt".to_string(), stamp);

        Ok(ProfileRow::new(&record.student_id, attrs))
    }

    /// Lazy rows for the record's aural evidence recordings, in source order
    ///
    /// The i-th row is stamped `now + i µs` so sort keys stay unique and
    /// ordered within the partition. Cloning the iterator restarts nothing;
    /// calling this again yields the same rows.
    pub fn normalize_recordings<'a>(
        &'a self,
        record: &'a StudentRecord,
        now: DateTime<Utc>,
    ) -> RecordingRows<'a> {
        RecordingRows {
            normalizer: self,
            record,
            uris: record.aural_recordings(),
            next: 0,
            now,
        }
    }

    fn recording_row(&self, record: &StudentRecord, index: usize, uri: &str, now: DateTime<Utc>) -> RecordingRow {
        let recording_id = recording_id(&record.student_id, index);
        let uploaded_at = to_row_timestamp(now + Duration::microseconds(index as i64));
        let file_name = file_name(uri, index);
        let format = file_format(&file_name);

        let mut attrs = BTreeMap::new();
        attrs.insert("recordingId".to_string(), AttributeValue::text(&recording_id));
        attrs.insert("studentId".to_string(), AttributeValue::text(&record.student_id));
        attrs.insert("s3Key".to_string(), AttributeValue::text(self.object_key(uri)));
        attrs.insert("s3Bucket".to_string(), AttributeValue::text(&self.bucket));
        attrs.insert("fileName".to_string(), AttributeValue::text(file_name));
        attrs.insert("fileSize".to_string(), AttributeValue::Integer(RECORDING_FILE_SIZE));
        attrs.insert("duration".to_string(), AttributeValue::Integer(RECORDING_DURATION_SECS));
        attrs.insert("format".to_string(), AttributeValue::text(format));
        attrs.insert("piece".to_string(), AttributeValue::text(AURAL_PIECE));
        attrs.insert("composer".to_string(), AttributeValue::text(AURAL_COMPOSER));
        attrs.insert("repertoireLevel".to_string(), AttributeValue::text(record.stage()));
        attrs.insert("performanceType".to_string(), AttributeValue::text(AURAL_PERFORMANCE_TYPE));
        attrs.insert("uploadedAt".to_string(), AttributeValue::text(&uploaded_at));
        attrs.insert("status".to_string(), AttributeValue::text(RECORDING_STATUS));

        RecordingRow::new(&record.student_id, &recording_id, &uploaded_at, attrs)
    }

    /// Store-relative key: the URI with `s3://<bucket>/` removed
    fn object_key<'u>(&self, uri: &'u str) -> &'u str {
        uri.strip_prefix("s3://")
            .and_then(|rest| rest.strip_prefix(self.bucket.as_str()))
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(uri)
    }
}

/// `<studentId>-aural-<NNN>` for the 0-based `index`
pub fn recording_id(student_id: &str, index: usize) -> String {
    format!("{student_id}-aural-{:03}", index + 1)
}

fn file_name(uri: &str, index: usize) -> String {
    match uri.rsplit_once('/') {
        Some((_, last)) if !last.is_empty() => last.to_string(),
        _ => format!("aural-{}.{DEFAULT_FORMAT}", index + 1),
    }
}

fn file_format(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| DEFAULT_FORMAT.to_string())
}

/// Iterator returned by [`RecordNormalizer::normalize_recordings`]
#[derive(Debug, Clone)]
pub struct RecordingRows<'a> {
    normalizer: &'a RecordNormalizer,
    record: &'a StudentRecord,
    uris: Vec<&'a str>,
    next: usize,
    now: DateTime<Utc>,
}

impl Iterator for RecordingRows<'_> {
    type Item = RecordingRow;

    fn next(&mut self) -> Option<RecordingRow> {
        let uri = *self.uris.get(self.next)?;
        let row = self
            .normalizer
            .recording_row(self.record, self.next, uri, self.now);
        self.next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.uris.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RecordingRows<'_> {}
