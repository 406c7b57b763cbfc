//! Transcription helpers
//!
//! Job naming, transcript document retrieval and text extraction for the
//! transcript-based analysis variant.

use crate::error::{is_transient_status, PipelineError, PipelineResult};
use crate::types::TranscriptFetcher;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

/// Transcription job name for a submission at `at`
pub fn job_name(at: DateTime<Utc>) -> String {
    format!("piano-job-{}", at.timestamp())
}

/// Pull the transcript text out of a transcription result document
///
/// Expected shape: `{"results": {"transcripts": [{"transcript": "..."}]}}`
pub fn extract_transcript(document: &JsonValue) -> PipelineResult<String> {
    document
        .pointer("/results/transcripts/0/transcript")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            PipelineError::invocation("transcript document has no results.transcripts[0].transcript")
        })
}

/// Fetches transcript documents over HTTP(S)
pub struct HttpTranscriptFetcher {
    http_client: reqwest::Client,
}

impl HttpTranscriptFetcher {
    pub fn new() -> PipelineResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PipelineError::invocation(format!("HTTP client setup failed: {e}")))?;
        Ok(Self { http_client })
    }
}

#[async_trait::async_trait]
impl TranscriptFetcher for HttpTranscriptFetcher {
    async fn fetch_transcript(&self, transcript_uri: &str) -> PipelineResult<String> {
        debug!(transcript_uri, "Fetching transcript");

        let response = self
            .http_client
            .get(transcript_uri)
            .send()
            .await
            .map_err(|e| PipelineError::Invocation {
                message: format!("transcript fetch failed: {e}"),
                transient: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Invocation {
                message: format!("transcript fetch rejected ({status})"),
                transient: is_transient_status(status),
            });
        }

        let document: JsonValue = response
            .json()
            .await
            .map_err(|e| PipelineError::invocation(format!("unreadable transcript document: {e}")))?;

        extract_transcript(&document)
    }
}
