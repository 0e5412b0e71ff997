use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::{
    alerts::PatientDirectory,
    db::{Alert, Database, EmergencyContact, Medication, Pending, SyncTable, VitalReading},
    remote::{RemoteResult, RemoteStore},
    settings::SyncSettings,
};

use super::state::{transition, SyncEvent, SyncStatus};

const ENABLE_LOGS: bool = true;
const STATUS_CHANNEL_CAPACITY: usize = 32;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SyncOutcome {
    /// At least one pass pushed records.
    Completed,
    /// Another pass was in flight; it will run once more when it finishes.
    Coalesced,
    SkippedOffline,
    NothingToSync,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub passes: usize,
    pub pushed: usize,
    pub failed: usize,
    /// Pushed, but a newer local write landed meanwhile; stays queued.
    pub superseded: usize,
    /// Unsynced records that hit the attempt cap.
    pub parked: usize,
    pub error: Option<String>,
}

impl SyncReport {
    fn new(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            passes: 0,
            pushed: 0,
            failed: 0,
            superseded: 0,
            parked: 0,
            error: None,
        }
    }

    fn absorb(&mut self, next: SyncReport) {
        if next.outcome == SyncOutcome::Completed {
            self.outcome = SyncOutcome::Completed;
        }
        self.passes += next.passes;
        self.pushed += next.pushed;
        self.failed += next.failed;
        self.superseded += next.superseded;
        self.parked = next.parked;
        if next.error.is_some() {
            self.error = next.error;
        }
    }
}

/// A cached record kind the engine knows how to push.
#[async_trait]
trait Outbound: Send + Sync + 'static {
    const TABLE: SyncTable;

    fn record_id(&self) -> &str;

    async fn push(&self, remote: &dyn RemoteStore) -> RemoteResult<()>;
}

#[async_trait]
impl Outbound for VitalReading {
    const TABLE: SyncTable = SyncTable::Vitals;

    fn record_id(&self) -> &str {
        &self.id
    }

    async fn push(&self, remote: &dyn RemoteStore) -> RemoteResult<()> {
        remote.put_vital(self).await
    }
}

#[async_trait]
impl Outbound for EmergencyContact {
    const TABLE: SyncTable = SyncTable::Contacts;

    fn record_id(&self) -> &str {
        &self.id
    }

    async fn push(&self, remote: &dyn RemoteStore) -> RemoteResult<()> {
        remote.put_contact(self).await
    }
}

#[async_trait]
impl Outbound for Medication {
    const TABLE: SyncTable = SyncTable::Medications;

    fn record_id(&self) -> &str {
        &self.id
    }

    async fn push(&self, remote: &dyn RemoteStore) -> RemoteResult<()> {
        remote.put_medication(self).await
    }
}

#[async_trait]
impl Outbound for Alert {
    const TABLE: SyncTable = SyncTable::Alerts;

    fn record_id(&self) -> &str {
        &self.id
    }

    async fn push(&self, remote: &dyn RemoteStore) -> RemoteResult<()> {
        remote.put_alert(self).await
    }
}

#[derive(Default)]
struct Batch {
    alerts: Vec<Pending<Alert>>,
    vitals: Vec<Pending<VitalReading>>,
    contacts: Vec<Pending<EmergencyContact>>,
    medications: Vec<Pending<Medication>>,
}

impl Batch {
    fn len(&self) -> usize {
        self.alerts.len() + self.vitals.len() + self.contacts.len() + self.medications.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Delay before the `attempts`-th retry: exponential from the base, capped,
/// with up to 10% jitter.
pub fn backoff_delay(attempts: u32, settings: &SyncSettings) -> Duration {
    let exponent = attempts.saturating_sub(1).min(20);
    let capped = settings
        .backoff_base_ms
        .saturating_mul(1u64 << exponent)
        .min(settings.backoff_max_ms);
    let jitter = if capped >= 10 {
        rand::thread_rng().gen_range(0..=capped / 10)
    } else {
        0
    };
    Duration::from_millis(capped.saturating_add(jitter).min(settings.backoff_max_ms))
}

struct EngineInner {
    db: Database,
    remote: Arc<dyn RemoteStore>,
    settings: SyncSettings,
    patients: Arc<PatientDirectory>,
    pass_lock: tokio::sync::Mutex<()>,
    rerun: AtomicBool,
    online: AtomicBool,
    status: Mutex<SyncStatus>,
    status_tx: watch::Sender<SyncStatus>,
    events_tx: broadcast::Sender<SyncStatus>,
}

/// Drains unsynced cache rows into the remote store. Cheap to clone; all
/// clones share one pass guard and one status.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Starts offline; the connectivity monitor reports the first real state.
    pub fn new(db: Database, remote: Arc<dyn RemoteStore>, settings: SyncSettings) -> Self {
        let patients = Arc::new(PatientDirectory::new(Arc::clone(&remote), db.clone()));
        Self::with_directory(db, remote, settings, patients)
    }

    pub fn with_directory(
        db: Database,
        remote: Arc<dyn RemoteStore>,
        settings: SyncSettings,
        patients: Arc<PatientDirectory>,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::Offline);
        let (events_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                db,
                remote,
                settings,
                patients,
                pass_lock: tokio::sync::Mutex::new(()),
                rerun: AtomicBool::new(false),
                online: AtomicBool::new(false),
                status: Mutex::new(SyncStatus::Offline),
                status_tx,
                events_tx,
            }),
        }
    }

    pub fn status(&self) -> SyncStatus {
        *self.lock_status()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Every status change in order.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.inner.events_tx.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Records connectivity without running a pass.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
        if !online {
            self.apply(SyncEvent::ConnectivityLost);
        }
    }

    /// Entry point for connectivity signals. Going online always requests a
    /// pass; repeated online signals are harmless.
    pub async fn handle_connectivity(&self, online: bool) -> Option<SyncReport> {
        self.set_online(online);
        if online {
            Some(self.sync_data().await)
        } else {
            None
        }
    }

    /// Runs one pass, or marks a rerun if a pass is already in flight.
    ///
    /// A trigger raises `rerun` before trying the guard, and the holder
    /// checks `rerun` again after releasing it, so a trigger that loses the
    /// race for the guard is always followed by a pass.
    pub async fn sync_data(&self) -> SyncReport {
        if !self.is_online() {
            log_debug!("sync skipped: offline");
            return SyncReport::new(SyncOutcome::SkippedOffline);
        }

        self.inner.rerun.store(true, Ordering::SeqCst);
        let mut merged: Option<SyncReport> = None;
        loop {
            let Ok(guard) = self.inner.pass_lock.try_lock() else {
                log_debug!("sync pass in flight, coalescing trigger");
                return merged.unwrap_or_else(|| SyncReport::new(SyncOutcome::Coalesced));
            };

            while self.inner.rerun.swap(false, Ordering::SeqCst) && self.is_online() {
                let next = self.run_pass().await;
                match merged.as_mut() {
                    Some(report) => {
                        log_debug!("ran coalesced sync pass");
                        report.absorb(next);
                    }
                    None => merged = Some(next),
                }
            }
            drop(guard);

            if !self.is_online() {
                return merged.unwrap_or_else(|| SyncReport::new(SyncOutcome::SkippedOffline));
            }
            if !self.inner.rerun.load(Ordering::SeqCst) {
                return merged.unwrap_or_else(|| SyncReport::new(SyncOutcome::Coalesced));
            }
        }
    }

    /// Makes parked records eligible again and runs a pass.
    pub async fn retry_parked(&self) -> Result<SyncReport> {
        let requeued = self.inner.db.reset_sync_attempts().await?;
        log_info!("requeued {requeued} unsynced records");
        Ok(self.sync_data().await)
    }

    async fn run_pass(&self) -> SyncReport {
        let max_attempts = self.inner.settings.max_attempts;
        let mut report = SyncReport::new(SyncOutcome::Completed);
        report.passes = 1;

        let mut batch = match self.load_batch(max_attempts, Utc::now()).await {
            Ok(batch) => batch,
            Err(err) => {
                log_error!("failed to read unsynced records: {err:#}");
                self.apply(SyncEvent::PassStarted);
                self.apply(SyncEvent::PassFailed);
                report.error = Some(format!("{err:#}"));
                return report;
            }
        };

        if batch.is_empty() {
            if self.is_online() && matches!(self.status(), SyncStatus::Offline | SyncStatus::SyncError) {
                self.apply(SyncEvent::ConnectivityRestored);
            }
            report.outcome = SyncOutcome::NothingToSync;
            report.parked = self.parked_count(max_attempts).await;
            return report;
        }

        self.apply(SyncEvent::PassStarted);
        log_info!("sync pass started with {} records", batch.len());

        self.address_alerts(&mut batch.alerts).await;
        self.drain(batch.alerts, &mut report).await;
        self.drain(batch.vitals, &mut report).await;
        self.drain(batch.contacts, &mut report).await;
        self.drain(batch.medications, &mut report).await;
        report.parked = self.parked_count(max_attempts).await;

        if !self.is_online() {
            log_info!("connectivity lost during sync pass");
        } else if report.failed == 0 {
            self.apply(SyncEvent::PassSucceeded);
            self.apply(SyncEvent::Settled);
        } else {
            self.apply(SyncEvent::PassFailed);
            report.error = Some(format!("{} records failed to sync", report.failed));
        }

        log_info!(
            "sync pass finished: pushed={} failed={} superseded={} parked={}",
            report.pushed,
            report.failed,
            report.superseded,
            report.parked
        );
        report
    }

    async fn load_batch(&self, max_attempts: u32, now: DateTime<Utc>) -> Result<Batch> {
        let db = &self.inner.db;
        Ok(Batch {
            alerts: db.pending_alerts(max_attempts, now).await?,
            vitals: db.pending_vitals(max_attempts, now).await?,
            contacts: db.pending_contacts(max_attempts, now).await?,
            medications: db.pending_medications(max_attempts, now).await?,
        })
    }

    /// Alerts raised while the patient lookup failed carry no doctor; they
    /// are addressed now, before the push.
    async fn address_alerts(&self, alerts: &mut [Pending<Alert>]) {
        for item in alerts.iter_mut().filter(|item| item.record.doctor_id.is_none()) {
            let Some(profile) = self.inner.patients.lookup(&item.record.patient_id).await else {
                continue;
            };
            if profile.assigned_doctor_id.is_none() {
                continue;
            }
            item.record.doctor_id = profile.assigned_doctor_id;
            item.record.patient_name = profile.name;
            match self.inner.db.readdress_alert(&item.record, item.sync_version).await {
                Ok(true) => log_debug!("alert {} addressed before push", item.record.id),
                Ok(false) => {}
                Err(err) => log_warn!("failed to readdress alert {}: {err:#}", item.record.id),
            }
        }
    }

    async fn drain<T: Outbound>(&self, pending: Vec<Pending<T>>, report: &mut SyncReport) {
        for item in pending {
            if !self.is_online() {
                return;
            }
            let id = item.record.record_id();
            match item.record.push(self.inner.remote.as_ref()).await {
                Ok(()) => match self.inner.db.mark_synced(T::TABLE, id, item.sync_version).await {
                    Ok(true) => report.pushed += 1,
                    Ok(false) => {
                        log_debug!("{} {id} changed during push, keeping it queued", T::TABLE.table_name());
                        report.superseded += 1;
                    }
                    Err(err) => {
                        log_warn!("failed to mark {} {id} synced: {err:#}", T::TABLE.table_name());
                        report.failed += 1;
                    }
                },
                Err(err) => {
                    report.failed += 1;
                    self.record_failure::<T>(id, &item, &err.to_string()).await;
                }
            }
        }
    }

    async fn record_failure<T: Outbound>(&self, id: &str, item: &Pending<T>, error: &str) {
        let settings = &self.inner.settings;
        let attempts = item.sync_attempts.saturating_add(1);
        let delay = backoff_delay(attempts, settings);
        let next_attempt_at =
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        if attempts >= settings.max_attempts {
            log_warn!(
                "{} {id} parked after {attempts} attempts: {error}",
                T::TABLE.table_name()
            );
        } else {
            log_debug!(
                "{} {id} failed (attempt {attempts}), retry in {delay:?}: {error}",
                T::TABLE.table_name()
            );
        }

        if let Err(err) = self
            .inner
            .db
            .record_sync_failure(T::TABLE, id, item.sync_version, next_attempt_at, error)
            .await
        {
            log_error!("failed to record sync failure for {id}: {err:#}");
        }
    }

    async fn parked_count(&self, max_attempts: u32) -> usize {
        match self.inner.db.parked_count(max_attempts).await {
            Ok(count) => count,
            Err(err) => {
                log_warn!("failed to count parked records: {err:#}");
                0
            }
        }
    }

    fn apply(&self, event: SyncEvent) {
        let mut status = self.lock_status();
        match transition(*status, event) {
            Ok(next) if next != *status => {
                log_debug!("sync status {} -> {}", *status, next);
                *status = next;
                self.inner.status_tx.send_replace(next);
                let _ = self.inner.events_tx.send(next);
            }
            Ok(_) => {}
            Err(err) => log_warn!("{err}"),
        }
    }

    fn lock_status(&self) -> MutexGuard<'_, SyncStatus> {
        match self.inner.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{test_support::temp_database, VitalType, VitalValue},
        remote::MemoryRemoteStore,
    };
    use chrono::TimeZone;

    fn no_backoff() -> SyncSettings {
        SyncSettings {
            max_attempts: 3,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }

    fn reading(minute: u32) -> VitalReading {
        VitalReading::new(
            "p1",
            VitalType::Temperature,
            VitalValue::Scalar(36.6),
            "°C",
            Utc.with_ymd_and_hms(2024, 5, 1, 8, minute, 0).unwrap(),
        )
    }

    #[test]
    fn backoff_grows_and_caps() {
        let settings = SyncSettings::default();
        let first = backoff_delay(1, &settings);
        assert!(first >= Duration::from_millis(2_000) && first <= Duration::from_millis(2_200));
        let third = backoff_delay(3, &settings);
        assert!(third >= Duration::from_millis(8_000));
        assert_eq!(backoff_delay(40, &settings), Duration::from_millis(300_000));
    }

    #[tokio::test]
    async fn offline_engine_skips() {
        let engine = SyncEngine::new(temp_database(), Arc::new(MemoryRemoteStore::new()), no_backoff());
        assert_eq!(engine.sync_data().await.outcome, SyncOutcome::SkippedOffline);
        assert_eq!(engine.status(), SyncStatus::Offline);
    }

    #[tokio::test]
    async fn second_pass_sends_nothing() {
        let db = temp_database();
        let remote = Arc::new(MemoryRemoteStore::new());
        for minute in 0..3 {
            db.upsert_vital(&reading(minute)).await.unwrap();
        }
        let engine = SyncEngine::new(db.clone(), remote.clone(), no_backoff());

        let first = engine.handle_connectivity(true).await.unwrap();
        assert_eq!(first.pushed, 3);
        assert_eq!(engine.status(), SyncStatus::Online);

        let second = engine.sync_data().await;
        assert_eq!(second.outcome, SyncOutcome::NothingToSync);
        assert_eq!(remote.total_writes(), 3);
        assert!(db.unsynced_vitals().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn going_offline_publishes_status() {
        let engine = SyncEngine::new(temp_database(), Arc::new(MemoryRemoteStore::new()), no_backoff());
        let mut status = engine.watch_status();
        engine.handle_connectivity(true).await;
        assert_eq!(*status.borrow_and_update(), SyncStatus::Online);
        engine.handle_connectivity(false).await;
        assert_eq!(*status.borrow_and_update(), SyncStatus::Offline);
    }
}
