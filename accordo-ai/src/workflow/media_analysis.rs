//! Media analysis pipeline
//!
//! local file → upload → wait until the service marks it ready → analysis
//! call → four-quadrant report. Fail-fast: the first error ends the run.

use crate::error::{PipelineError, PipelineResult};
use crate::models::{AssessmentReport, AttributeValue, JobState, MediaJob, MediaRef, RecordingRow};
use crate::services::job_poller::JobPoller;
use crate::services::prompt::media_prompt;
use crate::services::retry::RetryPolicy;
use crate::types::{
    AnalysisInvoker, ContentPart, MediaStatus, MediaStatusSource, MediaUploader, ModelConfig,
    RecordingWriter,
};
use accordo_common::time::to_row_timestamp;
use accordo_common::ScoreScale;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

const ASSESSMENT_PERFORMANCE_TYPE: &str = "AI Assessment";

/// Result of one completed analysis
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAnalysis {
    pub job: MediaJob,
    pub report_text: String,
    pub report: AssessmentReport,
}

pub struct MediaAnalysisPipeline {
    uploader: Arc<dyn MediaUploader>,
    status_source: Arc<dyn MediaStatusSource>,
    invoker: Arc<dyn AnalysisInvoker>,
    poller: JobPoller,
    retry: RetryPolicy,
    model_config: ModelConfig,
    instrument: String,
    scale: ScoreScale,
}

impl MediaAnalysisPipeline {
    pub fn new(
        uploader: Arc<dyn MediaUploader>,
        status_source: Arc<dyn MediaStatusSource>,
        invoker: Arc<dyn AnalysisInvoker>,
        scale: ScoreScale,
    ) -> Self {
        Self {
            uploader,
            status_source,
            invoker,
            poller: JobPoller::default(),
            retry: RetryPolicy::none(),
            model_config: ModelConfig::default(),
            instrument: "piano".to_string(),
            scale,
        }
    }

    pub fn with_poller(mut self, poller: JobPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Applied to the upload and analysis calls, never to status polls
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_model_config(mut self, model_config: ModelConfig) -> Self {
        self.model_config = model_config;
        self
    }

    pub fn with_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.instrument = instrument.into();
        self
    }

    pub async fn run(
        &self,
        local_path: &Path,
        cancel_token: &CancellationToken,
    ) -> PipelineResult<MediaAnalysis> {
        let uploader = self.uploader.as_ref();
        let media = self
            .retry
            .run("upload", || uploader.upload(local_path))
            .await?;

        let job = self.wait_until_ready(media, cancel_token).await?;
        let ready = MediaRef {
            uri: job.result_ref.clone().unwrap_or_else(|| job.media_ref.uri.clone()),
            ..job.media_ref.clone()
        };

        let content = vec![
            ContentPart::Media(ready),
            ContentPart::Text(media_prompt(&self.instrument, self.scale)),
        ];
        let invoker = self.invoker.as_ref();
        let model_config = &self.model_config;
        let content = &content;
        let report_text = self
            .retry
            .run("generate_content", || invoker.invoke(content, model_config))
            .await?;

        let report = AssessmentReport::parse(&report_text, self.scale)?;
        info!(job_id = %job.job_id, "Assessment report complete");

        Ok(MediaAnalysis {
            job,
            report_text,
            report,
        })
    }

    /// Poll until the staged media is usable, tracking every observed state
    async fn wait_until_ready(
        &self,
        media: MediaRef,
        cancel_token: &CancellationToken,
    ) -> PipelineResult<MediaJob> {
        let job_id = media.name.clone();
        let job = Mutex::new(MediaJob::new(job_id.clone(), media.clone()));
        let source = self.status_source.as_ref();

        let polled = {
            let job = &job;
            let media = &media;
            self.poller
                .await_terminal::<MediaStatus, _, _>(
                    &job_id,
                    || async move {
                        let status = source.media_status(media).await?;
                        observe(&mut *job.lock().await, &status);
                        Ok(status)
                    },
                    &[JobState::Ready],
                    &[JobState::Failed],
                    cancel_token,
                )
                .await
        };

        let mut job = job.into_inner();
        if let Err(err) = polled {
            let end_state = match err {
                PipelineError::Cancelled { .. } => JobState::Cancelled,
                _ => JobState::Failed,
            };
            if let Err(e) = job.transition_to(end_state, None) {
                warn!(job_id = %job.job_id, error = %e, "Could not close job");
            }
            return Err(err);
        }
        Ok(job)
    }
}

fn observe(job: &mut MediaJob, status: &MediaStatus) {
    let result_ref = (status.state == JobState::Ready).then(|| status.media.uri.clone());
    match job.transition_to(status.state, result_ref) {
        Ok(Some(t)) => info!(
            job_id = %t.job_id,
            from = %t.old_state,
            to = %t.new_state,
            "Media job transition"
        ),
        Ok(None) => {}
        Err(e) => warn!(job_id = %job.job_id, error = %e, "Ignoring out-of-order status"),
    }
}

/// Recording row carrying a completed assessment, in the student's partition
pub fn assessment_row(
    student_id: &str,
    local_path: &Path,
    analysis: &MediaAnalysis,
    now: DateTime<Utc>,
) -> RecordingRow {
    let recording_id = format!("{student_id}-ai-{}", Uuid::new_v4().simple());
    let uploaded_at = to_row_timestamp(now);
    let file_name = local_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let format = local_path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let file_size = std::fs::metadata(local_path).map(|m| m.len() as i64).unwrap_or(0);

    let mut attrs = BTreeMap::new();
    attrs.insert("recordingId".to_string(), AttributeValue::text(&recording_id));
    attrs.insert("studentId".to_string(), AttributeValue::text(student_id));
    attrs.insert("fileName".to_string(), AttributeValue::text(file_name));
    attrs.insert("fileSize".to_string(), AttributeValue::Integer(file_size));
    attrs.insert("format".to_string(), AttributeValue::text(format));
    attrs.insert(
        "mediaUri".to_string(),
        AttributeValue::text(analysis.job.result_ref.clone().unwrap_or_default()),
    );
    attrs.insert(
        "performanceType".to_string(),
        AttributeValue::text(ASSESSMENT_PERFORMANCE_TYPE),
    );
    attrs.insert("assessment".to_string(), analysis.report.to_attribute_value());
    attrs.insert("uploadedAt".to_string(), AttributeValue::text(&uploaded_at));
    attrs.insert("status".to_string(), AttributeValue::text("completed"));

    RecordingRow::new(student_id, &recording_id, &uploaded_at, attrs)
}

/// Write a completed assessment for `student_id`
pub async fn persist_assessment(
    writer: &dyn RecordingWriter,
    retry: &RetryPolicy,
    student_id: &str,
    local_path: &Path,
    analysis: &MediaAnalysis,
) -> PipelineResult<RecordingRow> {
    let row = assessment_row(student_id, local_path, analysis, accordo_common::time::now());
    retry
        .run("put_recording", || writer.put_recording(&row))
        .await?;
    info!(student_id, recording_id = %row.recording_id, "Assessment stored");
    Ok(row)
}
