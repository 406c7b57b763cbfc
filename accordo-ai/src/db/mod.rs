//! Keyed store for accordo-ai
//!
//! Two logical tables, both keyed by (partition key, sort key):
//! - `StudentProfiles`: one `PROFILE` row per student
//! - `PerformanceRecordings`: `RECORDING#<timestamp>` rows per student
//!
//! [`SqliteStore`] persists them; [`MemoryStore`] backs dry runs and tests.

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::SqliteStore;

use crate::error::PipelineResult;
use accordo_common::schema::{PERFORMANCE_RECORDINGS_TABLE, STUDENT_PROFILES_TABLE};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the database and ensure both tables exist
pub async fn init_database_pool(db_path: &Path) -> PipelineResult<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Create both tables if they don't exist
///
/// `attributes` holds the row's attributes as JSON in attribute-value form.
pub async fn init_tables(pool: &SqlitePool) -> PipelineResult<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {STUDENT_PROFILES_TABLE} (
            pk TEXT NOT NULL,
            sk TEXT NOT NULL,
            student_id TEXT NOT NULL,
            attributes TEXT NOT NULL,
            written_at TEXT NOT NULL,
            PRIMARY KEY (pk, sk)
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {PERFORMANCE_RECORDINGS_TABLE} (
            pk TEXT NOT NULL,
            sk TEXT NOT NULL,
            recording_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            attributes TEXT NOT NULL,
            written_at TEXT NOT NULL,
            PRIMARY KEY (pk, sk)
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_recordings_recording_id \
         ON {PERFORMANCE_RECORDINGS_TABLE} (pk, recording_id)"
    ))
    .execute(pool)
    .await?;

    Ok(())
}
