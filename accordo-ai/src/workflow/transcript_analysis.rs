//! Transcript analysis pipeline
//!
//! Submit a transcription job for already-staged media, wait for it to
//! complete, fetch the transcript, then run a text-only analysis call.

use crate::error::PipelineResult;
use crate::models::AssessmentReport;
use crate::services::job_poller::JobPoller;
use crate::services::prompt::transcript_prompt;
use crate::services::retry::RetryPolicy;
use crate::services::transcription::job_name;
use crate::types::{
    AnalysisInvoker, ContentPart, ModelConfig, TranscriptFetcher, TranscriptionRequest,
    TranscriptionService, TranscriptionState, TranscriptionStatus,
};
use accordo_common::ScoreScale;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptAnalysis {
    pub job_name: String,
    pub transcript: String,
    pub report_text: String,
    pub report: AssessmentReport,
}

pub struct TranscriptAnalysisPipeline {
    transcription: Arc<dyn TranscriptionService>,
    fetcher: Arc<dyn TranscriptFetcher>,
    invoker: Arc<dyn AnalysisInvoker>,
    poller: JobPoller,
    retry: RetryPolicy,
    model_config: ModelConfig,
    instrument: String,
    language_code: String,
    scale: ScoreScale,
}

impl TranscriptAnalysisPipeline {
    pub fn new(
        transcription: Arc<dyn TranscriptionService>,
        fetcher: Arc<dyn TranscriptFetcher>,
        invoker: Arc<dyn AnalysisInvoker>,
        scale: ScoreScale,
    ) -> Self {
        Self {
            transcription,
            fetcher,
            invoker,
            poller: JobPoller::default(),
            retry: RetryPolicy::none(),
            model_config: ModelConfig::default(),
            instrument: "piano".to_string(),
            language_code: "en-US".to_string(),
            scale,
        }
    }

    pub fn with_poller(mut self, poller: JobPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_model_config(mut self, model_config: ModelConfig) -> Self {
        self.model_config = model_config;
        self
    }

    /// `media_uri` must already be readable by the transcription service
    pub async fn run(
        &self,
        media_uri: &str,
        media_format: &str,
        cancel_token: &CancellationToken,
    ) -> PipelineResult<TranscriptAnalysis> {
        let request = TranscriptionRequest {
            job_name: job_name(accordo_common::time::now()),
            media_uri: media_uri.to_string(),
            media_format: media_format.to_string(),
            language_code: self.language_code.clone(),
        };

        let service = self.transcription.as_ref();
        let request = &request;
        let job_name = self
            .retry
            .run("submit_transcription", || service.submit(request))
            .await?;
        info!(job_name = %job_name, media_uri, "Transcription submitted");

        let status: TranscriptionStatus = {
            let job_name = job_name.as_str();
            self.poller
                .await_terminal(
                    job_name,
                    || service.status(job_name),
                    &[TranscriptionState::Completed],
                    &[TranscriptionState::Failed],
                    cancel_token,
                )
                .await?
        };

        let transcript_uri = status.transcript_uri.ok_or_else(|| {
            crate::error::PipelineError::invocation(format!(
                "transcription job {job_name} completed without a transcript URI"
            ))
        })?;

        let fetcher = self.fetcher.as_ref();
        let transcript_uri = transcript_uri.as_str();
        let transcript = self
            .retry
            .run("fetch_transcript", || fetcher.fetch_transcript(transcript_uri))
            .await?;

        let content = vec![ContentPart::Text(transcript_prompt(
            &self.instrument,
            &transcript,
            self.scale,
        ))];
        let invoker = self.invoker.as_ref();
        let content = &content;
        let model_config = &self.model_config;
        let report_text = self
            .retry
            .run("generate_content", || invoker.invoke(content, model_config))
            .await?;

        let report = AssessmentReport::parse(&report_text, self.scale)?;
        info!(job_name = %job_name, "Transcript assessment complete");

        Ok(TranscriptAnalysis {
            job_name,
            transcript,
            report_text,
            report,
        })
    }
}
