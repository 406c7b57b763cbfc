//! SQLite-backed keyed store

use crate::error::{PipelineError, PipelineResult};
use crate::models::{AttributeValue, ProfileRow, RecordingRow};
use crate::types::{ProfileWriter, RecordingWriter};
use accordo_common::schema::{
    student_partition_key, PERFORMANCE_RECORDINGS_TABLE, PROFILE_SORT_KEY, STUDENT_PROFILES_TABLE,
};
use accordo_common::time::{now, to_row_timestamp};
use serde_json::{Map, Value as JsonValue};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;

/// Upserting writer and reader over the two store tables
#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    /// Tables must already exist (see [`super::init_database_pool`])
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn get_profile(&self, student_id: &str) -> PipelineResult<Option<ProfileRow>> {
        let row = sqlx::query(&format!(
            "SELECT attributes FROM {STUDENT_PROFILES_TABLE} WHERE pk = ? AND sk = ?"
        ))
        .bind(student_partition_key(student_id))
        .bind(PROFILE_SORT_KEY)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => {
                let attributes = decode_attributes(&row.get::<String, _>("attributes"))?;
                Ok(Some(ProfileRow::new(student_id, attributes)))
            }
            None => Ok(None),
        }
    }

    /// A student's recordings in sort-key order
    pub async fn list_recordings(&self, student_id: &str) -> PipelineResult<Vec<RecordingRow>> {
        let rows = sqlx::query(&format!(
            "SELECT pk, sk, recording_id, attributes FROM {PERFORMANCE_RECORDINGS_TABLE} \
             WHERE pk = ? ORDER BY sk"
        ))
        .bind(student_partition_key(student_id))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RecordingRow {
                    partition_key: row.get("pk"),
                    sort_key: row.get("sk"),
                    recording_id: row.get("recording_id"),
                    student_id: student_id.to_string(),
                    attributes: decode_attributes(&row.get::<String, _>("attributes"))?,
                })
            })
            .collect()
    }

    pub async fn count_profiles(&self) -> PipelineResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {STUDENT_PROFILES_TABLE}"))
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    pub async fn count_recordings(&self) -> PipelineResult<i64> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {PERFORMANCE_RECORDINGS_TABLE}"))
                .fetch_one(&self.db)
                .await?;
        Ok(count)
    }
}

#[async_trait::async_trait]
impl ProfileWriter for SqliteStore {
    async fn put_profile(&self, row: &ProfileRow) -> PipelineResult<()> {
        let attributes = encode_attributes(&row.attributes)?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {STUDENT_PROFILES_TABLE} (pk, sk, student_id, attributes, written_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(pk, sk) DO UPDATE SET
                student_id = excluded.student_id,
                attributes = excluded.attributes,
                written_at = excluded.written_at
            "#
        ))
        .bind(&row.partition_key)
        .bind(&row.sort_key)
        .bind(&row.student_id)
        .bind(&attributes)
        .bind(to_row_timestamp(now()))
        .execute(&self.db)
        .await?;

        debug!(pk = %row.partition_key, sk = %row.sort_key, "Profile row written");
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordingWriter for SqliteStore {
    async fn put_recording(&self, row: &RecordingRow) -> PipelineResult<()> {
        let attributes = encode_attributes(&row.attributes)?;
        let mut tx = self.db.begin().await?;

        // Same recording under an earlier timestamp key
        sqlx::query(&format!(
            "DELETE FROM {PERFORMANCE_RECORDINGS_TABLE} WHERE pk = ? AND recording_id = ? AND sk <> ?"
        ))
        .bind(&row.partition_key)
        .bind(&row.recording_id)
        .bind(&row.sort_key)
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {PERFORMANCE_RECORDINGS_TABLE}
                (pk, sk, recording_id, student_id, attributes, written_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(pk, sk) DO UPDATE SET
                recording_id = excluded.recording_id,
                student_id = excluded.student_id,
                attributes = excluded.attributes,
                written_at = excluded.written_at
            "#
        ))
        .bind(&row.partition_key)
        .bind(&row.sort_key)
        .bind(&row.recording_id)
        .bind(&row.student_id)
        .bind(&attributes)
        .bind(to_row_timestamp(now()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(pk = %row.partition_key, sk = %row.sort_key, recording_id = %row.recording_id, "Recording row written");
        Ok(())
    }
}

/// Attribute map → JSON text in attribute-value form
pub fn encode_attributes(attributes: &BTreeMap<String, AttributeValue>) -> PipelineResult<String> {
    let mut map = Map::with_capacity(attributes.len());
    for (key, value) in attributes {
        map.insert(key.clone(), value.to_store_json()?);
    }
    serde_json::to_string(&JsonValue::Object(map))
        .map_err(|e| PipelineError::TypeConversion(e.to_string()))
}

pub fn decode_attributes(text: &str) -> PipelineResult<BTreeMap<String, AttributeValue>> {
    let value: JsonValue = serde_json::from_str(text)
        .map_err(|e| PipelineError::store(format!("corrupt attributes column: {e}")))?;
    let JsonValue::Object(map) = value else {
        return Err(PipelineError::store("attributes column is not an object"));
    };
    map.iter()
        .map(|(k, v)| Ok((k.clone(), AttributeValue::from_store_json(v)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_tables;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    async fn setup_store() -> SqliteStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_tables(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn profile(stage: &str) -> ProfileRow {
        let mut attrs = BTreeMap::new();
        attrs.insert("stage".to_string(), AttributeValue::text(stage));
        attrs.insert(
            "overallScore".to_string(),
            AttributeValue::Decimal(BigDecimal::from_str("7.5").unwrap()),
        );
        ProfileRow::new("S001", attrs)
    }

    fn recording(id: &str, timestamp: &str) -> RecordingRow {
        let mut attrs = BTreeMap::new();
        attrs.insert("recordingId".to_string(), AttributeValue::text(id));
        RecordingRow::new("S001", id, timestamp, attrs)
    }

    #[tokio::test]
    async fn test_profile_upsert_overwrites() {
        let store = setup_store().await;
        store.put_profile(&profile("Grade 4")).await.unwrap();
        store.put_profile(&profile("Grade 5")).await.unwrap();

        assert_eq!(store.count_profiles().await.unwrap(), 1);
        let stored = store.get_profile("S001").await.unwrap().unwrap();
        assert_eq!(stored.attributes["stage"], AttributeValue::text("Grade 5"));
        assert_eq!(
            stored.attributes["overallScore"],
            AttributeValue::Decimal(BigDecimal::from_str("7.5").unwrap())
        );
    }

    #[tokio::test]
    async fn test_recording_replaces_same_id_under_new_key() {
        let store = setup_store().await;
        store
            .put_recording(&recording("S001-aural-001", "2024-05-01T09:30:00.000000Z"))
            .await
            .unwrap();
        store
            .put_recording(&recording("S001-aural-002", "2024-05-01T09:30:00.000001Z"))
            .await
            .unwrap();
        store
            .put_recording(&recording("S001-aural-001", "2024-06-01T10:00:00.000000Z"))
            .await
            .unwrap();

        let rows = store.list_recordings("S001").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].recording_id, "S001-aural-002");
        assert_eq!(rows[1].recording_id, "S001-aural-001");
        assert_eq!(rows[1].sort_key, "RECORDING#2024-06-01T10:00:00.000000Z");
    }

    #[tokio::test]
    async fn test_unnormalized_float_rejected_before_write() {
        let store = setup_store().await;
        let mut row = profile("Grade 5");
        row.attributes
            .insert("raw".to_string(), AttributeValue::Float(0.1));

        let err = store.put_profile(&row).await.unwrap_err();
        assert!(matches!(err, PipelineError::TypeConversion(_)));
        assert_eq!(store.count_profiles().await.unwrap(), 0);
    }

    #[test]
    fn test_decode_rejects_corrupt_column() {
        assert!(matches!(
            decode_attributes("[1]"),
            Err(PipelineError::Store { transient: false, .. })
        ));
        assert!(decode_attributes("{}").unwrap().is_empty());
    }
}
