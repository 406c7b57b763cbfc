//! Bulk student-record import (source JSON → keyed store rows)

pub mod normalizer;
pub mod orchestrator;

pub use normalizer::{recording_id, RecordNormalizer, RecordingRows};
pub use orchestrator::{load_source_file, parse_source, ImportOrchestrator};
