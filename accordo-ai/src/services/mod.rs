//! External service clients and shared pipeline mechanics
//!
//! - Gemini media upload, status and generative analysis
//! - Transcript retrieval
//! - Cancellable job polling
//! - Retry with exponential backoff
//! - Assessment prompts

pub mod gemini_client;
pub mod job_poller;
pub mod prompt;
pub mod retry;
pub mod transcription;

pub use gemini_client::GeminiClient;
pub use job_poller::JobPoller;
pub use retry::RetryPolicy;
pub use transcription::HttpTranscriptFetcher;
