//! Import run results
//!
//! Per-record failures are collected here instead of aborting the batch.

use crate::error::{ErrorKind, PipelineError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A source record that could not be fully imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecord {
    /// `studentId`, or `#<index>` when the record has none
    pub record_id: String,
    /// Position in the source batch
    pub index: usize,
    pub kind: ErrorKind,
    pub message: String,
}

impl FailedRecord {
    pub fn new(record_id: impl Into<String>, index: usize, error: &PipelineError) -> Self {
        Self {
            record_id: record_id.into(),
            index,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Aggregate counts for one import run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub records_total: usize,
    pub profiles_attempted: usize,
    pub profiles_written: usize,
    pub recordings_attempted: usize,
    pub recordings_written: usize,
    /// Recordings written per student, zero entries included
    pub recordings_per_student: BTreeMap<String, usize>,
    pub failed: Vec<FailedRecord>,
    /// Records never started because the run was cancelled
    pub skipped: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ImportSummary {
    pub fn new(records_total: usize) -> Self {
        Self {
            records_total,
            profiles_attempted: 0,
            profiles_written: 0,
            recordings_attempted: 0,
            recordings_written: 0,
            recordings_per_student: BTreeMap::new(),
            failed: Vec::new(),
            skipped: 0,
            cancelled: false,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Identifiers of failed records, in batch order
    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.record_id.as_str()).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    pub fn finish(&mut self) {
        self.failed.sort_by_key(|f| f.index);
        self.ended_at = Some(Utc::now());
    }
}
