//! accordo-ai library interface
//!
//! Two independent pipelines sharing the keyed-store schema:
//! - media analysis: upload → wait for processing → four-quadrant assessment
//! - record import: source student JSON → profile and recording rows

pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod services;
pub mod types;
pub mod workflow;

pub use crate::error::{ErrorKind, PipelineError, PipelineResult};
