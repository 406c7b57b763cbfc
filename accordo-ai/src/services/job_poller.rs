//! Generic long-running job watcher
//!
//! Polls a status fetch at a fixed interval until the job reaches a
//! terminal state. Waiting is a cancellable timer suspension, never a
//! blocked thread. An optional maximum wait turns a job that never leaves
//! its in-progress state into `TimedOut`.

use crate::error::{PipelineError, PipelineResult};
use crate::types::JobStatus;
use accordo_common::config::PollingConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fixed-interval poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPoller {
    interval: Duration,
    max_wait: Option<Duration>,
}

impl JobPoller {
    /// `max_wait = None` polls until a terminal state, however long that takes
    pub fn new(interval: Duration, max_wait: Option<Duration>) -> Self {
        Self { interval, max_wait }
    }

    pub fn from_config(config: &PollingConfig) -> Self {
        Self::new(config.interval(), config.max_wait())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait
    }

    /// Poll `fetch_status` until the job is terminal
    ///
    /// `fetch_status` owns whatever handle identifies the job; `job_id` is
    /// only used for logs and errors. Fetch errors are returned as-is with
    /// no retry. A state in `failure_states` ends the wait with `JobFailed`
    /// immediately; a state in `terminal_states` returns that status.
    pub async fn await_terminal<S, F, Fut>(
        &self,
        job_id: &str,
        mut fetch_status: F,
        terminal_states: &[S::State],
        failure_states: &[S::State],
        cancel_token: &CancellationToken,
    ) -> PipelineResult<S>
    where
        S: JobStatus,
        F: FnMut() -> Fut,
        Fut: Future<Output = PipelineResult<S>>,
    {
        let started = Instant::now();
        let mut last_state: Option<S::State> = None;
        let mut polls: u64 = 0;

        loop {
            if cancel_token.is_cancelled() {
                info!(job_id, polls, "Polling cancelled");
                return Err(PipelineError::Cancelled {
                    job_id: job_id.to_string(),
                });
            }

            let status = fetch_status().await?;
            polls += 1;
            let state = status.state();

            if last_state != Some(state) {
                info!(job_id, state = %state, polls, "Job state observed");
                last_state = Some(state);
            } else {
                debug!(job_id, state = %state, polls, "Job still waiting");
            }

            if failure_states.contains(&state) {
                warn!(job_id, state = %state, "Job reached failure state");
                return Err(PipelineError::JobFailed {
                    job_id: job_id.to_string(),
                    state: state.to_string(),
                });
            }
            if terminal_states.contains(&state) {
                return Ok(status);
            }

            let mut pause = self.interval;
            if let Some(max_wait) = self.max_wait {
                let waited = started.elapsed();
                if waited >= max_wait {
                    warn!(job_id, state = %state, waited_secs = waited.as_secs(), "Job exceeded maximum wait");
                    return Err(PipelineError::TimedOut {
                        job_id: job_id.to_string(),
                        state: state.to_string(),
                        waited_secs: waited.as_secs(),
                    });
                }
                pause = pause.min(max_wait - waited);
            }

            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!(job_id, polls, "Polling cancelled while waiting");
                    return Err(PipelineError::Cancelled {
                        job_id: job_id.to_string(),
                    });
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

impl Default for JobPoller {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}
