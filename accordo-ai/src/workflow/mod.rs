//! Assessment pipelines
//!
//! - [`media_analysis`]: upload a performance recording, wait for the
//!   service to process it, analyze it directly
//! - [`transcript_analysis`]: transcribe staged media, analyze the transcript
//!
//! Both produce an [`AssessmentReport`](crate::models::AssessmentReport) on
//! the canonical score scale and stop at the first error.

pub mod media_analysis;
pub mod transcript_analysis;

pub use media_analysis::{assessment_row, persist_assessment, MediaAnalysis, MediaAnalysisPipeline};
pub use transcript_analysis::{TranscriptAnalysis, TranscriptAnalysisPipeline};
