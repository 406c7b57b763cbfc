//! Integration tests for the bulk student import

mod helpers;

use accordo_ai::db::MemoryStore;
use accordo_ai::import::{ImportOrchestrator, RecordNormalizer};
use accordo_ai::models::AttributeValue;
use accordo_ai::services::RetryPolicy;
use accordo_ai::ErrorKind;
use bigdecimal::BigDecimal;
use helpers::fakes::{CancellingStore, FlakyStore, SlowStore};
use helpers::create_test_store;
use helpers::fixtures::{student, student_s001, student_with_recordings};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn orchestrator() -> ImportOrchestrator {
    ImportOrchestrator::new(RecordNormalizer::new("accordo-recordings"))
}

#[tokio::test]
async fn test_example_record_yields_profile_and_two_recordings() {
    let store = MemoryStore::new();
    let summary = orchestrator()
        .import_all(vec![student_s001()], &store, &store)
        .await;

    assert!(summary.is_clean());
    assert_eq!(summary.profiles_written, 1);
    assert_eq!(summary.recordings_written, 2);
    assert_eq!(summary.recordings_per_student["S001"], 2);

    let profile = store.profile("S001").await.expect("profile row");
    assert_eq!(profile.partition_key, "STUDENT#S001");
    assert_eq!(profile.sort_key, "PROFILE");
    let AttributeValue::Map(artistry) = &profile.attributes["performingArtistry"] else {
        panic!("quadrant should be a mapping");
    };
    assert_eq!(
        artistry["overallScore"],
        AttributeValue::Decimal(BigDecimal::from_str("0.1").unwrap())
    );

    let recordings = store.recordings("S001").await;
    let ids: Vec<_> = recordings.iter().map(|r| r.recording_id.as_str()).collect();
    assert_eq!(ids, vec!["S001-aural-001", "S001-aural-002"]);
    assert!(recordings.iter().all(|r| r.partition_key == profile.partition_key));
}

#[tokio::test]
async fn test_missing_student_id_isolated() {
    let store = MemoryStore::new();
    let records = vec![
        student("S010"),
        json!({"profile": {"email": "nobody@x.com", "name": "Nobody"}}),
        student_with_recordings("S011", 3),
    ];

    let summary = orchestrator().import_all(records, &store, &store).await;

    assert_eq!(summary.records_total, 3);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].record_id, "#1");
    assert_eq!(summary.failed[0].kind, ErrorKind::MalformedRecord);
    assert_eq!(summary.profiles_attempted, 2);
    assert_eq!(summary.profiles_written, 2);
    assert_eq!(summary.recordings_written, 3);
    assert_eq!(summary.recordings_per_student["S010"], 0);
    assert_eq!(store.profile_count().await, 2);
}

#[tokio::test]
async fn test_missing_email_reports_student_id() {
    let store = MemoryStore::new();
    let records = vec![json!({"studentId": "S020", "profile": {"name": "No Email"}})];

    let summary = orchestrator().import_all(records, &store, &store).await;
    assert_eq!(summary.failed_ids(), vec!["S020"]);
    assert!(summary.failed[0].message.contains("profile.email"));
    assert!(!summary.recordings_per_student.contains_key("S020"));
}

#[tokio::test]
async fn test_write_failure_isolated_to_its_record() {
    let store = FlakyStore::new(0, &["S031"]);
    let records = vec![
        student_with_recordings("S030", 1),
        student_with_recordings("S031", 2),
        student_with_recordings("S032", 1),
    ];

    let summary = orchestrator().import_all(records, &store, &store).await;

    assert_eq!(summary.failed_ids(), vec!["S031"]);
    assert_eq!(summary.failed[0].kind, ErrorKind::Store);
    assert_eq!(summary.profiles_attempted, 3);
    assert_eq!(summary.profiles_written, 2);
    assert_eq!(summary.recordings_attempted, 2);
    assert_eq!(summary.recordings_written, 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_write_failures_retried() {
    let store = FlakyStore::new(2, &[]);
    let retry = RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(1),
    };

    let summary = orchestrator()
        .with_retry(retry)
        .import_all(vec![student_with_recordings("S040", 1)], &store, &store)
        .await;

    assert!(summary.is_clean());
    assert_eq!(summary.recordings_written, 1);
    // 2 failed profile attempts, 1 profile write, 1 recording write
    assert_eq!(store.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_transient_failure_without_retry_fails_record() {
    let store = FlakyStore::new(1, &[]);
    let summary = orchestrator()
        .import_all(vec![student("S041"), student("S042")], &store, &store)
        .await;

    assert_eq!(summary.failed_ids(), vec!["S041"]);
    assert_eq!(summary.profiles_written, 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_is_bounded() {
    let store = SlowStore::default();
    let records: Vec<_> = (0..6).map(|i| student(&format!("S05{i}"))).collect();

    let summary = orchestrator()
        .with_concurrency(2)
        .import_all(records, &store, &store)
        .await;

    assert!(summary.is_clean());
    assert_eq!(summary.profiles_written, 6);
    assert_eq!(store.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancellation_stops_scheduling() {
    let token = CancellationToken::new();
    let store = CancellingStore {
        inner: MemoryStore::new(),
        token: token.clone(),
    };
    let records = vec![student("S060"), student("S061"), student("S062")];

    let summary = orchestrator()
        .with_cancel_token(token)
        .import_all(records, &store, &store)
        .await;

    assert!(summary.cancelled);
    assert!(!summary.is_clean());
    assert_eq!(summary.profiles_written, 1);
    assert_eq!(summary.skipped, 2);
    assert!(summary.failed.is_empty());
}

#[tokio::test]
async fn test_already_cancelled_writes_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let store = MemoryStore::new();

    let summary = orchestrator()
        .with_cancel_token(token)
        .import_all(vec![student("S070")], &store, &store)
        .await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.profiles_attempted, 0);
    assert_eq!(store.profile_count().await, 0);
}

#[tokio::test]
async fn test_failed_records_listed_in_batch_order() {
    let store = MemoryStore::new();
    let records = vec![json!({}), student("S080"), json!({"studentId": "S081"}), json!(42)];

    let summary = orchestrator()
        .with_concurrency(4)
        .import_all(records, &store, &store)
        .await;

    assert_eq!(summary.failed_ids(), vec!["#0", "S081", "#3"]);
    assert!(summary.ended_at.is_some());
}

/// Attributes with the per-run timestamps removed
fn stable(mut attributes: BTreeMap<String, AttributeValue>) -> BTreeMap<String, AttributeValue> {
    for key in ["createdAt", "updatedAt", "lastAssessmentDate", "uploadedAt"] {
        attributes.remove(key);
    }
    attributes
}

#[tokio::test]
async fn test_reimport_into_sqlite_is_idempotent() {
    let (_temp_dir, store) = create_test_store().await;
    let batch = || vec![student_s001(), student_with_recordings("S090", 3)];

    let first = orchestrator().import_all(batch(), &store, &store).await;
    assert!(first.is_clean());
    let profile_before = store.get_profile("S001").await.unwrap().expect("profile row");
    let recordings_before = store.list_recordings("S090").await.unwrap();
    assert_eq!(store.count_profiles().await.unwrap(), 2);
    assert_eq!(store.count_recordings().await.unwrap(), 5);

    let second = orchestrator().import_all(batch(), &store, &store).await;
    assert!(second.is_clean());
    assert_eq!(store.count_profiles().await.unwrap(), 2);
    assert_eq!(store.count_recordings().await.unwrap(), 5);

    let profile_after = store.get_profile("S001").await.unwrap().expect("profile row");
    assert_eq!(stable(profile_after.attributes), stable(profile_before.attributes));

    let recordings_after = store.list_recordings("S090").await.unwrap();
    let ids = |rows: &[accordo_ai::models::RecordingRow]| {
        rows.iter().map(|r| r.recording_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&recordings_after), ids(&recordings_before));
    for (after, before) in recordings_after.into_iter().zip(recordings_before) {
        assert_eq!(stable(after.attributes), stable(before.attributes));
    }
}
