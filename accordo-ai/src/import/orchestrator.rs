//! Bulk student import
//!
//! Records are independent: each one is validated, normalized and written
//! (profile first, then its recordings) inside its own future. A bounded
//! number of records are in flight at once; outcomes are folded into the
//! [`ImportSummary`] by this coordinator only. One record failing never
//! stops the batch.

use crate::error::{PipelineError, PipelineResult};
use crate::import::normalizer::RecordNormalizer;
use crate::models::{FailedRecord, ImportSummary, StudentRecord};
use crate::services::retry::RetryPolicy;
use crate::types::{ProfileWriter, RecordingWriter};
use accordo_common::config::TomlConfig;
use futures::stream::{FuturesUnordered, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::Value as JsonValue;
use std::num::NonZeroU32;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What happened to one source record
#[derive(Debug)]
struct RecordOutcome {
    index: usize,
    record_id: String,
    /// Set once the record validated
    student_id: Option<String>,
    profile_attempted: bool,
    profile_written: bool,
    recordings_attempted: usize,
    recordings_written: usize,
    error: Option<PipelineError>,
}

impl RecordOutcome {
    fn new(index: usize, record_id: String) -> Self {
        Self {
            index,
            record_id,
            student_id: None,
            profile_attempted: false,
            profile_written: false,
            recordings_attempted: 0,
            recordings_written: 0,
            error: None,
        }
    }
}

/// Drives normalization and store writes for a batch of source records
pub struct ImportOrchestrator {
    normalizer: RecordNormalizer,
    concurrency: usize,
    write_limiter: Option<DefaultDirectRateLimiter>,
    retry: RetryPolicy,
    cancel_token: CancellationToken,
}

impl ImportOrchestrator {
    /// Sequential, unthrottled, single attempt per write
    pub fn new(normalizer: RecordNormalizer) -> Self {
        Self {
            normalizer,
            concurrency: 1,
            write_limiter: None,
            retry: RetryPolicy::none(),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &TomlConfig) -> Self {
        Self::new(RecordNormalizer::new(config.import.recordings_bucket.clone()))
            .with_concurrency(config.import.concurrency)
            .with_write_rate(config.import.writes_per_second)
            .with_retry(RetryPolicy::from_config(&config.retry))
    }

    /// Records in flight at once (minimum 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Store writes per second across all records; 0 disables throttling
    pub fn with_write_rate(mut self, writes_per_second: u32) -> Self {
        self.write_limiter =
            NonZeroU32::new(writes_per_second).map(|rate| RateLimiter::direct(Quota::per_second(rate)));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Once cancelled, no further records are started
    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Import every record, collecting per-record failures
    pub async fn import_all(
        &self,
        records: Vec<JsonValue>,
        profiles: &dyn ProfileWriter,
        recordings: &dyn RecordingWriter,
    ) -> ImportSummary {
        let mut summary = ImportSummary::new(records.len());
        info!(
            records = records.len(),
            concurrency = self.concurrency,
            "Starting import"
        );

        let mut pending = records.into_iter().enumerate();
        let mut in_flight = FuturesUnordered::new();

        // Seed initial batch
        for _ in 0..self.concurrency {
            if self.cancel_token.is_cancelled() {
                break;
            }
            match pending.next() {
                Some((index, record)) => {
                    in_flight.push(self.import_record(index, record, profiles, recordings))
                }
                None => break,
            }
        }

        // Fold outcomes and top up
        while let Some(outcome) = in_flight.next().await {
            Self::fold(&mut summary, outcome);

            if self.cancel_token.is_cancelled() {
                continue;
            }
            if let Some((index, record)) = pending.next() {
                in_flight.push(self.import_record(index, record, profiles, recordings));
            }
        }

        summary.skipped = pending.count();
        summary.cancelled = self.cancel_token.is_cancelled();
        summary.finish();

        if summary.cancelled {
            warn!(skipped = summary.skipped, "Import cancelled");
        }
        info!(
            profiles_written = summary.profiles_written,
            recordings_written = summary.recordings_written,
            failed = summary.failed.len(),
            "Import finished"
        );
        summary
    }

    fn fold(summary: &mut ImportSummary, outcome: RecordOutcome) {
        summary.profiles_attempted += usize::from(outcome.profile_attempted);
        summary.profiles_written += usize::from(outcome.profile_written);
        summary.recordings_attempted += outcome.recordings_attempted;
        summary.recordings_written += outcome.recordings_written;

        if let Some(student_id) = outcome.student_id {
            *summary.recordings_per_student.entry(student_id).or_insert(0) +=
                outcome.recordings_written;
        }
        if let Some(error) = outcome.error {
            warn!(
                record_id = %outcome.record_id,
                index = outcome.index,
                kind = %error.kind(),
                error = %error,
                "Record failed"
            );
            summary
                .failed
                .push(FailedRecord::new(outcome.record_id, outcome.index, &error));
        }
    }

    async fn import_record(
        &self,
        index: usize,
        source: JsonValue,
        profiles: &dyn ProfileWriter,
        recordings: &dyn RecordingWriter,
    ) -> RecordOutcome {
        let record_id =
            StudentRecord::peek_student_id(&source).unwrap_or_else(|| format!("#{index}"));
        let mut outcome = RecordOutcome::new(index, record_id);

        if let Err(error) = self.write_record(source, profiles, recordings, &mut outcome).await {
            outcome.error = Some(error);
        }
        outcome
    }

    async fn write_record(
        &self,
        source: JsonValue,
        profiles: &dyn ProfileWriter,
        recordings: &dyn RecordingWriter,
        outcome: &mut RecordOutcome,
    ) -> PipelineResult<()> {
        let record = StudentRecord::from_json(source)?;
        outcome.student_id = Some(record.student_id.clone());

        let now = accordo_common::time::now();
        let profile = &self.normalizer.normalize_profile(&record, now)?;

        outcome.profile_attempted = true;
        let limiter = self.write_limiter.as_ref();
        self.retry
            .run("put_profile", || async move {
                if let Some(limiter) = limiter {
                    limiter.until_ready().await;
                }
                profiles.put_profile(profile).await
            })
            .await?;
        outcome.profile_written = true;

        for row in self.normalizer.normalize_recordings(&record, now) {
            outcome.recordings_attempted += 1;
            let row = &row;
            self.retry
                .run("put_recording", || async move {
                    if let Some(limiter) = limiter {
                        limiter.until_ready().await;
                    }
                    recordings.put_recording(row).await
                })
                .await?;
            outcome.recordings_written += 1;
        }

        debug!(
            student_id = %record.student_id,
            name = %record.display_name(),
            recordings = outcome.recordings_written,
            "Record imported"
        );
        Ok(())
    }
}

/// Read the `students` array of a source file
pub fn load_source_file(path: &Path) -> PipelineResult<Vec<JsonValue>> {
    let content = std::fs::read_to_string(path)?;
    parse_source(&content)
}

/// Parse source file content; the top level must carry a `students` array
pub fn parse_source(content: &str) -> PipelineResult<Vec<JsonValue>> {
    let document: JsonValue = serde_json::from_str(content)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    match document {
        JsonValue::Object(mut top) => match top.remove("students") {
            Some(JsonValue::Array(students)) => Ok(students),
            _ => Err(PipelineError::malformed("students")),
        },
        _ => Err(PipelineError::malformed("students")),
    }
}
