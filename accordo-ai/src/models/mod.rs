//! Data models for accordo-ai
//!
//! - Media job state machine
//! - Four-quadrant assessment report
//! - Source student records and derived store rows
//! - Tagged attribute values with exact decimals
//! - Import run summary

pub mod assessment;
pub mod import_summary;
pub mod media_job;
pub mod student;
pub mod value;

pub use assessment::{AssessmentReport, QuadrantAssessment};
pub use import_summary::{FailedRecord, ImportSummary};
pub use media_job::{JobState, MediaJob, MediaRef, StateTransition, TransitionError};
pub use student::{KeyedRow, ProfileRow, RecordingRow, StudentRecord};
pub use value::AttributeValue;
