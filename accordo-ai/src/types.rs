//! Service traits and the values that cross them
//!
//! External collaborators (media staging, analysis, transcription, keyed
//! store) are reached only through these traits. Concrete clients live in
//! `services` and `db`; tests substitute in-memory fakes.

use crate::error::PipelineResult;
use crate::models::{JobState, MediaRef, ProfileRow, RecordingRow};
use accordo_common::config::AnalysisConfig;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::path::Path;

// ============================================================================
// Polling
// ============================================================================

/// Status object returned by a status fetch
pub trait JobStatus {
    type State: Copy + PartialEq + Debug + Display + Send + Sync;

    fn state(&self) -> Self::State;
}

// ============================================================================
// Media staging and processing
// ============================================================================

/// Observed state of staged media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStatus {
    pub media: MediaRef,
    pub state: JobState,
}

impl JobStatus for MediaStatus {
    type State = JobState;

    fn state(&self) -> JobState {
        self.state
    }
}

/// Transfers a local file to where the processing service can read it
#[async_trait::async_trait]
pub trait MediaUploader: Send + Sync {
    /// Fails with `Upload` on I/O failure or service rejection
    async fn upload(&self, local_path: &Path) -> PipelineResult<MediaRef>;
}

/// Reports processing state of staged media
#[async_trait::async_trait]
pub trait MediaStatusSource: Send + Sync {
    async fn media_status(&self, media: &MediaRef) -> PipelineResult<MediaStatus>;
}

// ============================================================================
// Generative analysis
// ============================================================================

/// One element of an analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentPart {
    Media(MediaRef),
    Text(String),
}

/// Recognized generation options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Caps response length
    pub max_output_tokens: u32,
    /// Determinism/variability of the generated text
    pub temperature: f32,
}

impl From<&AnalysisConfig> for ModelConfig {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        (&AnalysisConfig::default()).into()
    }
}

/// Invokes the generative-analysis service
///
/// Returns raw report text; structure is checked by the caller.
#[async_trait::async_trait]
pub trait AnalysisInvoker: Send + Sync {
    /// Fails with `Invocation` on service, auth or quota failure
    async fn invoke(&self, content: &[ContentPart], config: &ModelConfig) -> PipelineResult<String>;
}

// ============================================================================
// Transcription
// ============================================================================

/// Transcription job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranscriptionState {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl Display for TranscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TranscriptionState::Queued => "QUEUED",
            TranscriptionState::InProgress => "IN_PROGRESS",
            TranscriptionState::Completed => "COMPLETED",
            TranscriptionState::Failed => "FAILED",
        })
    }
}

/// Observed state of a transcription job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionStatus {
    pub job_name: String,
    pub state: TranscriptionState,
    /// Present once COMPLETED
    pub transcript_uri: Option<String>,
    pub failure_reason: Option<String>,
}

impl JobStatus for TranscriptionStatus {
    type State = TranscriptionState;

    fn state(&self) -> TranscriptionState {
        self.state
    }
}

/// Submission parameters for a transcription job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    pub job_name: String,
    pub media_uri: String,
    pub media_format: String,
    pub language_code: String,
}

/// Speech/audio transcription service
#[async_trait::async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Returns the job name to poll
    async fn submit(&self, request: &TranscriptionRequest) -> PipelineResult<String>;

    async fn status(&self, job_name: &str) -> PipelineResult<TranscriptionStatus>;
}

/// Retrieves transcript documents by URI
#[async_trait::async_trait]
pub trait TranscriptFetcher: Send + Sync {
    async fn fetch_transcript(&self, transcript_uri: &str) -> PipelineResult<String>;
}

// ============================================================================
// Keyed store
// ============================================================================

/// Upserts profile rows keyed by (partition key, sort key)
#[async_trait::async_trait]
pub trait ProfileWriter: Send + Sync {
    async fn put_profile(&self, row: &ProfileRow) -> PipelineResult<()>;
}

/// Upserts recording rows keyed by (partition key, sort key)
///
/// Implementations replace any earlier row in the same partition that
/// carries the same `recordingId`.
#[async_trait::async_trait]
pub trait RecordingWriter: Send + Sync {
    async fn put_recording(&self, row: &RecordingRow) -> PipelineResult<()>;
}
