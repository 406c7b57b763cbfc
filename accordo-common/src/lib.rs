//! # Accordo Common Library
//!
//! Shared code for the Accordo crates:
//! - Error type
//! - TOML configuration loading
//! - Tracing setup
//! - Four-quadrant scoring constants
//! - Keyed-store schema (partition/sort keys, table names)

pub mod config;
pub mod error;
pub mod logging;
pub mod quadrant;
pub mod schema;
pub mod time;

pub use error::{Error, Result};
pub use quadrant::{Quadrant, ScoreScale, CANONICAL_SCALE};
