//! Error types for accordo-ai
//!
//! Pipeline A (media analysis) is fail-fast: any of these aborts the job.
//! Pipeline B (import) records the [`ErrorKind`] per failed record and keeps
//! going.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline error taxonomy
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Local I/O failure or service rejection while staging media
    #[error("Upload failed: {message}")]
    Upload { message: String, transient: bool },

    /// A polled job reached a failure state
    #[error("Job {job_id} failed in state {state}")]
    JobFailed { job_id: String, state: String },

    /// Analysis or transcription call rejected (service, auth, quota)
    #[error("Invocation failed: {message}")]
    Invocation { message: String, transient: bool },

    /// Required identity field missing from a source record
    #[error("Malformed record: missing required field `{field}`")]
    MalformedRecord { field: String },

    /// Value could not be converted for the store
    #[error("Type conversion failed: {0}")]
    TypeConversion(String),

    /// Poll loop observed the cancellation signal
    #[error("Job {job_id} cancelled")]
    Cancelled { job_id: String },

    /// Poll loop exceeded its maximum wait
    #[error("Job {job_id} still {state} after {waited_secs}s")]
    TimedOut {
        job_id: String,
        state: String,
        waited_secs: u64,
    },

    /// Generated report lacks one or more quadrants
    #[error("Incomplete report: {0}")]
    IncompleteReport(String),

    /// Keyed store write failed
    #[error("Store error: {message}")]
    Store { message: String, transient: bool },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Stable error names reported in import summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "UploadError")]
    Upload,
    #[serde(rename = "JobFailedError")]
    JobFailed,
    #[serde(rename = "InvocationError")]
    Invocation,
    #[serde(rename = "MalformedRecordError")]
    MalformedRecord,
    #[serde(rename = "TypeConversionError")]
    TypeConversion,
    #[serde(rename = "CancelledError")]
    Cancelled,
    #[serde(rename = "TimedOutError")]
    TimedOut,
    #[serde(rename = "IncompleteReportError")]
    IncompleteReport,
    #[serde(rename = "StoreError")]
    Store,
    #[serde(rename = "IoError")]
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Upload => "UploadError",
            ErrorKind::JobFailed => "JobFailedError",
            ErrorKind::Invocation => "InvocationError",
            ErrorKind::MalformedRecord => "MalformedRecordError",
            ErrorKind::TypeConversion => "TypeConversionError",
            ErrorKind::Cancelled => "CancelledError",
            ErrorKind::TimedOut => "TimedOutError",
            ErrorKind::IncompleteReport => "IncompleteReportError",
            ErrorKind::Store => "StoreError",
            ErrorKind::Io => "IoError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Upload { .. } => ErrorKind::Upload,
            PipelineError::JobFailed { .. } => ErrorKind::JobFailed,
            PipelineError::Invocation { .. } => ErrorKind::Invocation,
            PipelineError::MalformedRecord { .. } => ErrorKind::MalformedRecord,
            PipelineError::TypeConversion(_) => ErrorKind::TypeConversion,
            PipelineError::Cancelled { .. } => ErrorKind::Cancelled,
            PipelineError::TimedOut { .. } => ErrorKind::TimedOut,
            PipelineError::IncompleteReport(_) => ErrorKind::IncompleteReport,
            PipelineError::Store { .. } => ErrorKind::Store,
            PipelineError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether retrying the same call may succeed
    ///
    /// Only network-level failures, throttling and 5xx responses qualify.
    /// Validation errors and terminal job states never do.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Upload { transient, .. }
            | PipelineError::Invocation { transient, .. }
            | PipelineError::Store { transient, .. } => *transient,
            _ => false,
        }
    }

    pub fn upload(message: impl Into<String>) -> Self {
        PipelineError::Upload {
            message: message.into(),
            transient: false,
        }
    }

    pub fn invocation(message: impl Into<String>) -> Self {
        PipelineError::Invocation {
            message: message.into(),
            transient: false,
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        PipelineError::Store {
            message: message.into(),
            transient: false,
        }
    }

    pub fn malformed(field: impl Into<String>) -> Self {
        PipelineError::MalformedRecord {
            field: field.into(),
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        let transient = matches!(
            err,
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
        ) || err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code == "5" || code == "6") // SQLITE_BUSY / SQLITE_LOCKED
            .unwrap_or(false);

        PipelineError::Store {
            message: err.to_string(),
            transient,
        }
    }
}

/// Whether an HTTP status is worth retrying
pub(crate) fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}
