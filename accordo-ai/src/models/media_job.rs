//! Long-running media job state machine
//!
//! PENDING → PROCESSING → READY | FAILED | CANCELLED
//!
//! Transitions only move forward. A job's `result_ref` is set exactly when
//! it is READY.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque handle to staged media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Service-assigned resource name, used for status lookups
    pub name: String,
    /// URI the analysis call resolves
    pub uri: String,
    pub mime_type: String,
}

/// Media job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Submitted, not yet picked up
    Pending,
    /// Service is working on it
    Processing,
    /// Usable by the analysis call
    Ready,
    /// Service gave up
    Failed,
    /// Caller stopped waiting
    Cancelled,
}

impl JobState {
    fn rank(self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Processing => 1,
            JobState::Ready | JobState::Failed | JobState::Cancelled => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Processing => "PROCESSING",
            JobState::Ready => "READY",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot move from {from} back to {to}")]
    Regression { from: JobState, to: JobState },

    #[error("READY requires a result reference")]
    MissingResult,

    #[error("only READY may carry a result reference (got {0})")]
    UnexpectedResult(JobState),
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub job_id: String,
    pub old_state: JobState,
    pub new_state: JobState,
    pub transitioned_at: DateTime<Utc>,
}

/// One long-running external operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaJob {
    pub job_id: String,
    pub media_ref: MediaRef,
    pub state: JobState,
    pub result_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MediaJob {
    /// Create a job for freshly staged media
    pub fn new(job_id: impl Into<String>, media_ref: MediaRef) -> Self {
        Self {
            job_id: job_id.into(),
            media_ref,
            state: JobState::Pending,
            result_ref: None,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Apply an observed state
    ///
    /// Re-observing the current state is a no-op and returns `Ok(None)`.
    pub fn transition_to(
        &mut self,
        new_state: JobState,
        result_ref: Option<String>,
    ) -> Result<Option<StateTransition>, TransitionError> {
        match (new_state, &result_ref) {
            (JobState::Ready, None) => return Err(TransitionError::MissingResult),
            (state, Some(_)) if state != JobState::Ready => {
                return Err(TransitionError::UnexpectedResult(state))
            }
            _ => {}
        }

        if new_state == self.state {
            return Ok(None);
        }
        if self.state.is_terminal() || new_state.rank() < self.state.rank() {
            return Err(TransitionError::Regression {
                from: self.state,
                to: new_state,
            });
        }

        let transition = StateTransition {
            job_id: self.job_id.clone(),
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;
        self.result_ref = result_ref;
        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        Ok(Some(transition))
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
