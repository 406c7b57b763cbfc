//! Database test utilities

use accordo_ai::db::{init_database_pool, SqliteStore};
use tempfile::TempDir;

/// File-backed store in a temporary directory
///
/// Returns (TempDir, SqliteStore) - TempDir must be kept alive for duration of test
pub async fn create_test_store() -> (TempDir, SqliteStore) {
    let temp_dir = TempDir::new().expect("create temp dir");
    let db_path = temp_dir.path().join("accordo_test.db");
    let pool = init_database_pool(&db_path)
        .await
        .expect("init test database");
    (temp_dir, SqliteStore::new(pool))
}
