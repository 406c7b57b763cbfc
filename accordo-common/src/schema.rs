//! Keyed-store schema shared by the import and analysis pipelines
//!
//! Rows are grouped by a partition key `STUDENT#<studentId>`. Within a
//! partition the profile row uses the constant sort key `PROFILE` and each
//! recording uses `RECORDING#<timestamp>`.

/// Logical table holding one profile row per student
pub const STUDENT_PROFILES_TABLE: &str = "StudentProfiles";

/// Logical table holding recording rows
pub const PERFORMANCE_RECORDINGS_TABLE: &str = "PerformanceRecordings";

/// Sort key of the profile row
pub const PROFILE_SORT_KEY: &str = "PROFILE";

const STUDENT_PREFIX: &str = "STUDENT#";
const RECORDING_PREFIX: &str = "RECORDING#";

/// Partition key for a student
pub fn student_partition_key(student_id: &str) -> String {
    format!("{STUDENT_PREFIX}{student_id}")
}

/// Sort key for a recording uploaded at `timestamp`
pub fn recording_sort_key(timestamp: &str) -> String {
    format!("{RECORDING_PREFIX}{timestamp}")
}
