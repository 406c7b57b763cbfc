//! In-memory keyed store for dry runs

use crate::error::PipelineResult;
use crate::models::{KeyedRow, ProfileRow, RecordingRow};
use crate::types::{ProfileWriter, RecordingWriter};
use accordo_common::schema::{student_partition_key, PROFILE_SORT_KEY};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

type Key = (String, String);

/// Same upsert rules as [`super::SqliteStore`], nothing persisted
#[derive(Default)]
pub struct MemoryStore {
    profiles: RwLock<BTreeMap<Key, ProfileRow>>,
    recordings: RwLock<BTreeMap<Key, RecordingRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn profile(&self, student_id: &str) -> Option<ProfileRow> {
        let key = (student_partition_key(student_id), PROFILE_SORT_KEY.to_string());
        self.profiles.read().await.get(&key).cloned()
    }

    /// A student's recordings in sort-key order
    pub async fn recordings(&self, student_id: &str) -> Vec<RecordingRow> {
        let pk = student_partition_key(student_id);
        self.recordings
            .read()
            .await
            .iter()
            .filter(|((row_pk, _), _)| *row_pk == pk)
            .map(|(_, row)| row.clone())
            .collect()
    }

    pub async fn profile_count(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn recording_count(&self) -> usize {
        self.recordings.read().await.len()
    }
}

#[async_trait::async_trait]
impl ProfileWriter for MemoryStore {
    async fn put_profile(&self, row: &ProfileRow) -> PipelineResult<()> {
        // Reject anything the real store could not encode
        row.to_item_json()?;
        self.profiles.write().await.insert(
            (row.partition_key.clone(), row.sort_key.clone()),
            row.clone(),
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordingWriter for MemoryStore {
    async fn put_recording(&self, row: &RecordingRow) -> PipelineResult<()> {
        row.to_item_json()?;
        let mut recordings = self.recordings.write().await;
        recordings.retain(|(pk, sk), existing| {
            !(*pk == row.partition_key
                && existing.recording_id == row.recording_id
                && *sk != row.sort_key)
        });
        recordings.insert(
            (row.partition_key.clone(), row.sort_key.clone()),
            row.clone(),
        );
        Ok(())
    }
}
