#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::{RwLock, RwLockWriteGuard};

use healthsync_lib::{
    db::{
        Acknowledgment, Alert, ContactPriority, Database, EmergencyContact, Medication,
        PatientProfile, VitalReading, VitalType, VitalValue,
    },
    remote::{MemoryRemoteStore, RemoteError, RemoteResult, RemoteStore},
    settings::SyncSettings,
    thresholds::ThresholdConfig,
};

pub fn temp_database() -> Database {
    let path = std::env::temp_dir()
        .join("healthsync-tests")
        .join(format!("{}.sqlite3", uuid::Uuid::new_v4()));
    Database::new(path).expect("open temp database")
}

pub fn fast_retry(max_attempts: u32) -> SyncSettings {
    SyncSettings {
        max_attempts,
        backoff_base_ms: 0,
        backoff_max_ms: 0,
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

pub fn heart_rate(patient: &str, seconds: i64, bpm: f64) -> VitalReading {
    VitalReading::new(
        patient,
        VitalType::HeartRate,
        VitalValue::Scalar(bpm),
        "bpm",
        base_time() + Duration::seconds(seconds),
    )
}

pub fn contact(id: &str, patient: &str, priority: ContactPriority) -> EmergencyContact {
    EmergencyContact {
        id: id.into(),
        patient_id: patient.into(),
        name: format!("Contact {id}"),
        relationship: "Sibling".into(),
        phone: "555-0100".into(),
        priority,
        synced: false,
    }
}

pub fn medication(id: &str, patient: &str) -> Medication {
    Medication {
        id: id.into(),
        patient_id: patient.into(),
        name: "Metformin".into(),
        dosage: "500 mg".into(),
        schedule: "twice daily".into(),
        synced: false,
    }
}

/// Wraps the in-memory store with a failure switch and a gate that can hold
/// every call until released.
pub struct FlakyRemote {
    pub inner: Arc<MemoryRemoteStore>,
    failing: AtomicBool,
    gate: RwLock<()>,
}

impl FlakyRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MemoryRemoteStore::new()),
            failing: AtomicBool::new(false),
            gate: RwLock::new(()),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls block until the returned guard is dropped.
    pub async fn hold(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }

    async fn enter(&self) -> RemoteResult<()> {
        let _pass = self.gate.read().await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FlakyRemote {
    async fn put_vital(&self, reading: &VitalReading) -> RemoteResult<()> {
        self.enter().await?;
        self.inner.put_vital(reading).await
    }

    async fn put_contact(&self, contact: &EmergencyContact) -> RemoteResult<()> {
        self.enter().await?;
        self.inner.put_contact(contact).await
    }

    async fn put_medication(&self, medication: &Medication) -> RemoteResult<()> {
        self.enter().await?;
        self.inner.put_medication(medication).await
    }

    async fn fetch_contacts(&self, patient_id: &str) -> RemoteResult<Vec<EmergencyContact>> {
        self.enter().await?;
        self.inner.fetch_contacts(patient_id).await
    }

    async fn fetch_medications(&self, patient_id: &str) -> RemoteResult<Vec<Medication>> {
        self.enter().await?;
        self.inner.fetch_medications(patient_id).await
    }

    async fn fetch_patient(&self, patient_id: &str) -> RemoteResult<Option<PatientProfile>> {
        self.enter().await?;
        self.inner.fetch_patient(patient_id).await
    }

    async fn load_thresholds(&self) -> RemoteResult<Option<ThresholdConfig>> {
        self.enter().await?;
        self.inner.load_thresholds().await
    }

    async fn save_thresholds(&self, config: &ThresholdConfig) -> RemoteResult<()> {
        self.enter().await?;
        self.inner.save_thresholds(config).await
    }

    async fn put_alert(&self, alert: &Alert) -> RemoteResult<()> {
        self.enter().await?;
        self.inner.put_alert(alert).await
    }

    async fn acknowledge_alert(
        &self,
        alert_id: &str,
        acknowledgment: &Acknowledgment,
    ) -> RemoteResult<Alert> {
        self.enter().await?;
        self.inner.acknowledge_alert(alert_id, acknowledgment).await
    }

    async fn list_alerts(&self, doctor_id: &str) -> RemoteResult<Vec<Alert>> {
        self.enter().await?;
        self.inner.list_alerts(doctor_id).await
    }
}
