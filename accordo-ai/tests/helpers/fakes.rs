//! In-memory stand-ins for the external services

use accordo_ai::db::MemoryStore;
use accordo_ai::models::{JobState, MediaRef, ProfileRow, RecordingRow};
use accordo_ai::types::{
    AnalysisInvoker, ContentPart, MediaStatus, MediaStatusSource, MediaUploader, ModelConfig,
    ProfileWriter, RecordingWriter, TranscriptFetcher, TranscriptionRequest, TranscriptionService,
    TranscriptionState, TranscriptionStatus,
};
use accordo_ai::{PipelineError, PipelineResult};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Four-quadrant JSON reply on the 1-100 scale
pub fn complete_report() -> String {
    r#"Here is the assessment:
```json
{
  "technicalSkillsCompetence": {"score": 78, "feedback": "Even scales, tense wrists in octaves."},
  "compositionalMusicianshipKnowledge": {"score": 71, "feedback": "Phrasing follows the harmony."},
  "repertoireCulturalKnowledge": {"score": 65, "feedback": "Rubato is idiomatic for Debussy."},
  "performingArtistry": {"score": 84, "feedback": "Confident, communicative delivery."}
}
```"#
        .to_string()
}

// ============================================================================
// Store writers
// ============================================================================

/// MemoryStore that fails selected writes
///
/// - the first `transient_failures` writes fail with a transient store error
/// - any write for a student in `broken_students` fails permanently
pub struct FlakyStore {
    pub inner: MemoryStore,
    transient_failures: AtomicUsize,
    broken_students: HashSet<String>,
    pub calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(transient_failures: usize, broken_students: &[&str]) -> Self {
        Self {
            inner: MemoryStore::new(),
            transient_failures: AtomicUsize::new(transient_failures),
            broken_students: broken_students.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn check(&self, student_id: &str) -> PipelineResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken_students.contains(student_id) {
            return Err(PipelineError::store("constraint violation"));
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(PipelineError::Store {
                message: "database is locked".into(),
                transient: true,
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProfileWriter for FlakyStore {
    async fn put_profile(&self, row: &ProfileRow) -> PipelineResult<()> {
        self.check(&row.student_id)?;
        self.inner.put_profile(row).await
    }
}

#[async_trait::async_trait]
impl RecordingWriter for FlakyStore {
    async fn put_recording(&self, row: &RecordingRow) -> PipelineResult<()> {
        self.check(&row.student_id)?;
        self.inner.put_recording(row).await
    }
}

/// Profile writer that records peak concurrency
#[derive(Default)]
pub struct SlowStore {
    pub inner: MemoryStore,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

#[async_trait::async_trait]
impl ProfileWriter for SlowStore {
    async fn put_profile(&self, row: &ProfileRow) -> PipelineResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.put_profile(row).await
    }
}

#[async_trait::async_trait]
impl RecordingWriter for SlowStore {
    async fn put_recording(&self, row: &RecordingRow) -> PipelineResult<()> {
        self.inner.put_recording(row).await
    }
}

/// Cancels `token` on the first profile write
pub struct CancellingStore {
    pub inner: MemoryStore,
    pub token: CancellationToken,
}

#[async_trait::async_trait]
impl ProfileWriter for CancellingStore {
    async fn put_profile(&self, row: &ProfileRow) -> PipelineResult<()> {
        self.token.cancel();
        self.inner.put_profile(row).await
    }
}

#[async_trait::async_trait]
impl RecordingWriter for CancellingStore {
    async fn put_recording(&self, row: &RecordingRow) -> PipelineResult<()> {
        self.inner.put_recording(row).await
    }
}

// ============================================================================
// Media service
// ============================================================================

/// Upload + status + analysis service driven by a script
pub struct FakeMediaService {
    states: Mutex<VecDeque<JobState>>,
    reply: PipelineResult<String>,
    reject_upload: bool,
    pub status_calls: AtomicUsize,
    pub invoke_calls: AtomicUsize,
    pub last_content: Mutex<Vec<ContentPart>>,
}

impl FakeMediaService {
    /// Status reads replay `states`, repeating the last one
    pub fn new(states: Vec<JobState>, reply: String) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(states.into()),
            reply: Ok(reply),
            reject_upload: false,
            status_calls: AtomicUsize::new(0),
            invoke_calls: AtomicUsize::new(0),
            last_content: Mutex::new(Vec::new()),
        })
    }

    pub fn rejecting_upload() -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(VecDeque::from([JobState::Ready])),
            reply: Ok(complete_report()),
            reject_upload: true,
            status_calls: AtomicUsize::new(0),
            invoke_calls: AtomicUsize::new(0),
            last_content: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_invocation(message: &str) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(VecDeque::from([JobState::Ready])),
            reply: Err(PipelineError::invocation(message)),
            reject_upload: false,
            status_calls: AtomicUsize::new(0),
            invoke_calls: AtomicUsize::new(0),
            last_content: Mutex::new(Vec::new()),
        })
    }

    fn media() -> MediaRef {
        MediaRef {
            name: "files/perf-123".into(),
            uri: "https://media.test/v1beta/files/perf-123".into(),
            mime_type: "video/mp4".into(),
        }
    }
}

#[async_trait::async_trait]
impl MediaUploader for FakeMediaService {
    async fn upload(&self, local_path: &Path) -> PipelineResult<MediaRef> {
        if self.reject_upload {
            return Err(PipelineError::upload(format!(
                "{}: unsupported format",
                local_path.display()
            )));
        }
        Ok(Self::media())
    }
}

#[async_trait::async_trait]
impl MediaStatusSource for FakeMediaService {
    async fn media_status(&self, media: &MediaRef) -> PipelineResult<MediaStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let state = {
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                states.pop_front().unwrap()
            } else {
                *states.front().unwrap()
            }
        };
        Ok(MediaStatus {
            media: media.clone(),
            state,
        })
    }
}

#[async_trait::async_trait]
impl AnalysisInvoker for FakeMediaService {
    async fn invoke(&self, content: &[ContentPart], _config: &ModelConfig) -> PipelineResult<String> {
        self.invoke_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_content.lock().unwrap() = content.to_vec();
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(e) => Err(PipelineError::invocation(e.to_string())),
        }
    }
}

// ============================================================================
// Transcription
// ============================================================================

/// Transcription service completing after `polls_until_done` status reads
pub struct FakeTranscription {
    polls_until_done: usize,
    fail: bool,
    pub submitted: Mutex<Vec<TranscriptionRequest>>,
    pub status_calls: AtomicUsize,
    pub transcript: String,
}

impl FakeTranscription {
    pub fn new(polls_until_done: usize, transcript: &str) -> Arc<Self> {
        Arc::new(Self {
            polls_until_done,
            fail: false,
            submitted: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            transcript: transcript.to_string(),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            polls_until_done: 1,
            fail: true,
            submitted: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            transcript: String::new(),
        })
    }
}

#[async_trait::async_trait]
impl TranscriptionService for FakeTranscription {
    async fn submit(&self, request: &TranscriptionRequest) -> PipelineResult<String> {
        self.submitted.lock().unwrap().push(request.clone());
        Ok(request.job_name.clone())
    }

    async fn status(&self, job_name: &str) -> PipelineResult<TranscriptionStatus> {
        let n = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let state = if n < self.polls_until_done {
            TranscriptionState::InProgress
        } else if self.fail {
            TranscriptionState::Failed
        } else {
            TranscriptionState::Completed
        };
        Ok(TranscriptionStatus {
            job_name: job_name.to_string(),
            state,
            transcript_uri: (state == TranscriptionState::Completed)
                .then(|| format!("https://transcripts.test/{job_name}.json")),
            failure_reason: self.fail.then(|| "unsupported media".to_string()),
        })
    }
}

#[async_trait::async_trait]
impl TranscriptFetcher for FakeTranscription {
    async fn fetch_transcript(&self, _transcript_uri: &str) -> PipelineResult<String> {
        Ok(self.transcript.clone())
    }
}
