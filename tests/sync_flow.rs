mod common;

use std::sync::Arc;

use healthsync_lib::{
    alerts::{AlertEvaluator, SilentNotifier},
    cache::{CacheStore, NoQuota},
    db::{ContactPriority, SyncTable, VitalValue},
    ingest::Ingestor,
    remote::{RemoteStore, CONTACTS_COLLECTION, MEDICATIONS_COLLECTION, VITALS_COLLECTION},
    sync::{SyncEngine, SyncOutcome, SyncStatus},
    thresholds::ThresholdRegistry,
};

use common::{contact, fast_retry, heart_rate, medication, temp_database, FlakyRemote};

fn drain_statuses(rx: &mut tokio::sync::broadcast::Receiver<SyncStatus>) -> Vec<SyncStatus> {
    let mut seen = Vec::new();
    while let Ok(status) = rx.try_recv() {
        seen.push(status);
    }
    seen
}

#[tokio::test]
async fn offline_cache_drains_in_status_order() {
    let db = temp_database();
    let remote = FlakyRemote::new();
    let cache = CacheStore::new(db.clone(), Arc::new(NoQuota), 10);

    for second in 0..3 {
        assert!(cache.upsert_vital(&heart_rate("p1", second, 80.0)).await.stored);
    }
    cache.upsert_contact(&contact("c1", "p1", ContactPriority::Primary)).await;
    cache.upsert_contact(&contact("c2", "p1", ContactPriority::Secondary)).await;
    cache.upsert_medication(&medication("m1", "p1")).await;

    let before = cache.get_unsynced_data().await.value;
    assert_eq!(before.vitals.len(), 3);
    assert_eq!(before.contacts.len(), 2);
    assert_eq!(before.medications.len(), 1);

    let engine = SyncEngine::new(db, remote.clone(), fast_retry(5));
    assert_eq!(engine.status(), SyncStatus::Offline);
    let mut statuses = engine.subscribe();

    let report = engine.handle_connectivity(true).await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert_eq!(report.pushed, 6);
    assert_eq!(report.failed, 0);

    assert!(cache.get_unsynced_data().await.value.is_empty());
    assert_eq!(
        drain_statuses(&mut statuses),
        vec![SyncStatus::Syncing, SyncStatus::Synced, SyncStatus::Online]
    );
    assert_eq!(remote.inner.vitals().len(), 3);
    assert_eq!(remote.inner.contacts().len(), 2);
    assert_eq!(remote.inner.medications().len(), 1);
}

#[tokio::test]
async fn repeated_sync_submits_each_record_once() {
    let db = temp_database();
    let remote = FlakyRemote::new();
    let cache = CacheStore::new(db.clone(), Arc::new(NoQuota), 10);
    let readings: Vec<_> = (0..5).map(|s| heart_rate("p1", s, 75.0)).collect();
    for reading in &readings {
        cache.upsert_vital(reading).await;
    }
    cache.upsert_contact(&contact("c1", "p1", ContactPriority::Other)).await;

    let engine = SyncEngine::new(db, remote.clone(), fast_retry(5));
    engine.handle_connectivity(true).await;
    let snapshot = remote.inner.vitals();

    // Duplicate online signals are expected from the monitor.
    let again = engine.handle_connectivity(true).await.unwrap();
    assert_eq!(again.outcome, SyncOutcome::NothingToSync);
    engine.sync_data().await;

    assert_eq!(remote.inner.vitals(), snapshot);
    for reading in &readings {
        assert_eq!(remote.inner.write_count(VITALS_COLLECTION, &reading.id), 1);
    }
    assert_eq!(remote.inner.write_count(CONTACTS_COLLECTION, "c1"), 1);
}

#[tokio::test]
async fn reading_ingested_offline_is_synced_after_reconnect() {
    let db = temp_database();
    let remote = FlakyRemote::new();
    let cache = CacheStore::new(db.clone(), Arc::new(NoQuota), 10);
    let registry = Arc::new(ThresholdRegistry::new(remote.clone(), db.clone()));
    let evaluator = Arc::new(AlertEvaluator::new(
        registry,
        cache.clone(),
        remote.clone(),
        Arc::new(SilentNotifier),
    ));
    let engine = SyncEngine::new(db, remote.clone(), fast_retry(5));
    let ingestor = Ingestor::new(cache.clone(), evaluator).with_sync(engine.clone());

    let outcome = ingestor
        .ingest_line(r#"{"patientId":"p7","vitalType":"temperature","value":36.8,"unit":"°C","timestamp":"2024-05-01T10:00:00Z"}"#)
        .await
        .unwrap();
    let id = outcome.reading.id.clone();

    let unsynced = cache.get_unsynced_data().await.value;
    assert_eq!(unsynced.vitals.len(), 1);
    assert_eq!(unsynced.vitals[0].id, id);

    engine.handle_connectivity(true).await;

    let cached = cache.get_patient_vitals("p7", 10).await.value;
    assert!(cached[0].synced);
    assert_eq!(cached[0].value, VitalValue::Scalar(36.8));
    assert!(cache.get_unsynced_data().await.value.vitals.is_empty());
}

#[tokio::test]
async fn failures_back_off_and_park_at_the_cap() {
    let db = temp_database();
    let remote = FlakyRemote::new();
    remote.set_failing(true);
    let cache = CacheStore::new(db.clone(), Arc::new(NoQuota), 10);
    cache.upsert_vital(&heart_rate("p1", 0, 70.0)).await;
    cache.upsert_medication(&medication("m1", "p1")).await;

    let engine = SyncEngine::new(db.clone(), remote.clone(), fast_retry(3));
    let first = engine.handle_connectivity(true).await.unwrap();
    assert_eq!(first.failed, 2);
    assert_eq!(engine.status(), SyncStatus::SyncError);
    assert!(first.error.is_some());

    engine.sync_data().await;
    let third = engine.sync_data().await;
    assert_eq!(third.parked, 2);

    // Parked rows are no longer attempted.
    let fourth = engine.sync_data().await;
    assert_eq!(fourth.outcome, SyncOutcome::NothingToSync);
    assert_eq!(fourth.parked, 2);
    assert_eq!(engine.status(), SyncStatus::Online);
    assert_eq!(cache.get_unsynced_data().await.value.len(), 2);

    remote.set_failing(false);
    let retried = engine.retry_parked().await.unwrap();
    assert_eq!(retried.pushed, 2);
    assert_eq!(retried.parked, 0);
    assert!(cache.get_unsynced_data().await.value.is_empty());
    assert_eq!(remote.inner.write_count(MEDICATIONS_COLLECTION, "m1"), 1);
}

#[tokio::test]
async fn trigger_during_pass_is_coalesced() {
    let db = temp_database();
    let remote = FlakyRemote::new();
    let cache = CacheStore::new(db.clone(), Arc::new(NoQuota), 10);
    cache.upsert_vital(&heart_rate("p1", 0, 70.0)).await;

    let engine = SyncEngine::new(db, remote.clone(), fast_retry(5));
    engine.set_online(true);

    let gate = remote.hold().await;
    let mut status = engine.watch_status();
    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.sync_data().await }
    });
    status
        .wait_for(|current| *current == SyncStatus::Syncing)
        .await
        .unwrap();

    let second = engine.sync_data().await;
    assert_eq!(second.outcome, SyncOutcome::Coalesced);

    drop(gate);
    let report = running.await.unwrap();
    assert_eq!(report.passes, 2);
    assert_eq!(report.pushed, 1);
    assert_eq!(remote.inner.total_writes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_leave_nothing_queued() {
    let db = temp_database();
    let remote = FlakyRemote::new();
    let cache = CacheStore::new(db.clone(), Arc::new(NoQuota), 500);
    let engine = SyncEngine::new(db, remote.clone(), fast_retry(5));
    engine.set_online(true);

    for round in 0..20i64 {
        let mut tasks = Vec::new();
        for worker in 0..8i64 {
            let cache = cache.clone();
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .upsert_vital(&heart_rate("p1", round * 8 + worker, 70.0))
                    .await;
                engine.sync_data().await
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        // Every trigger returned, so its record must have been pushed by
        // some pass, even when the trigger itself was coalesced.
        assert!(cache.get_unsynced_data().await.value.is_empty(), "round {round}");
    }
    assert_eq!(remote.inner.vitals().len(), 160);
}

#[tokio::test]
async fn newer_local_write_survives_an_in_flight_push() {
    let db = temp_database();
    let cache = CacheStore::new(db.clone(), Arc::new(NoQuota), 10);
    cache.upsert_contact(&contact("c1", "p1", ContactPriority::Primary)).await;

    let pending = db
        .pending_contacts(5, chrono::Utc::now())
        .await
        .unwrap()
        .remove(0);

    let mut edited = contact("c1", "p1", ContactPriority::Primary);
    edited.phone = "555-0199".into();
    cache.upsert_contact(&edited).await;

    let flipped = db
        .mark_synced(SyncTable::Contacts, "c1", pending.sync_version)
        .await
        .unwrap();
    assert!(!flipped);
    let unsynced = cache.get_unsynced_data().await.value;
    assert_eq!(unsynced.contacts.len(), 1);
    assert_eq!(unsynced.contacts[0].phone, "555-0199");
}

#[tokio::test]
async fn going_offline_mid_session_is_reported() {
    let db = temp_database();
    let remote = FlakyRemote::new();
    let engine = SyncEngine::new(db, remote.clone(), fast_retry(5));

    engine.handle_connectivity(true).await;
    assert_eq!(engine.status(), SyncStatus::Online);
    assert!(engine.handle_connectivity(false).await.is_none());
    assert_eq!(engine.status(), SyncStatus::Offline);
    assert_eq!(engine.sync_data().await.outcome, SyncOutcome::SkippedOffline);
    assert!(remote.load_thresholds().await.unwrap().is_none());
}
