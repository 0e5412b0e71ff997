use std::{future::Future, sync::Arc};

use anyhow::Result;

use crate::db::{
    Alert, Database, EmergencyContact, Medication, StorageInfo, UnsyncedData, VitalReading,
};

use super::quota::QuotaProvider;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Result of a best-effort cache read: always carries a usable value, plus
/// the reason when the storage layer failed and the value is a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    pub value: T,
    pub degraded: Option<String>,
}

impl<T> CacheRead<T> {
    fn ok(value: T) -> Self {
        Self {
            value,
            degraded: None,
        }
    }

    fn fallback(value: T, reason: String) -> Self {
        Self {
            value,
            degraded: Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Result of a best-effort cache write.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheWrite {
    pub stored: bool,
    pub degraded: Option<String>,
}

impl CacheWrite {
    fn from_result(op: &str, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                stored: true,
                degraded: None,
            },
            Err(err) => {
                log_warn!("cache write '{op}' failed: {err:#}");
                Self {
                    stored: false,
                    degraded: Some(format!("{err:#}")),
                }
            }
        }
    }
}

/// Offline cache for vitals, emergency contacts, medications and locally
/// raised alerts. Never returns an error to callers: storage failures are
/// logged and surfaced through `CacheRead::degraded` / `CacheWrite::degraded`.
#[derive(Clone)]
pub struct CacheStore {
    db: Database,
    quota: Arc<dyn QuotaProvider>,
    vitals_per_patient: usize,
}

impl CacheStore {
    pub fn new(db: Database, quota: Arc<dyn QuotaProvider>, vitals_per_patient: usize) -> Self {
        Self {
            db,
            quota,
            vitals_per_patient: vitals_per_patient.max(1),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn vitals_per_patient(&self) -> usize {
        self.vitals_per_patient
    }

    /// Most recent first, at most `limit` readings.
    pub async fn get_patient_vitals(&self, patient_id: &str, limit: usize) -> CacheRead<Vec<VitalReading>> {
        read_or_default("get_patient_vitals", self.db.get_patient_vitals(patient_id, limit)).await
    }

    pub async fn get_emergency_contacts(&self, patient_id: &str) -> CacheRead<Vec<EmergencyContact>> {
        read_or_default("get_emergency_contacts", self.db.get_emergency_contacts(patient_id)).await
    }

    pub async fn get_medications(&self, patient_id: &str) -> CacheRead<Vec<Medication>> {
        read_or_default("get_medications", self.db.get_medications(patient_id)).await
    }

    pub async fn get_unsynced_data(&self) -> CacheRead<UnsyncedData> {
        let db = self.db.clone();
        read_or_default("get_unsynced_data", async move {
            Ok::<_, anyhow::Error>(UnsyncedData {
                vitals: db.unsynced_vitals().await?,
                contacts: db.unsynced_contacts().await?,
                medications: db.unsynced_medications().await?,
                alerts: db.unsynced_alerts().await?,
            })
        })
        .await
    }

    /// Capacity of the cache volume. Zeroed when the platform cannot report it.
    pub async fn get_storage_info(&self) -> CacheRead<StorageInfo> {
        let quota = Arc::clone(&self.quota);
        let db = self.db.clone();
        let estimate = tokio::task::spawn_blocking(move || {
            quota
                .estimate(db.path())
                .map(|estimate| (estimate, db.file_usage_bytes()))
        })
        .await;

        match estimate {
            Ok(Some((estimate, usage))) => {
                let quota = usage.saturating_add(estimate.available_space);
                CacheRead::ok(StorageInfo::from_estimate(quota, usage))
            }
            Ok(None) => {
                log_debug!("storage quota introspection unavailable");
                CacheRead::fallback(
                    StorageInfo::default(),
                    "storage quota introspection unavailable".into(),
                )
            }
            Err(err) => {
                log_warn!("storage estimate task failed: {err}");
                CacheRead::fallback(StorageInfo::default(), err.to_string())
            }
        }
    }

    /// Stores a live-feed reading as unsynced and trims old synced readings
    /// for the patient.
    pub async fn upsert_vital(&self, reading: &VitalReading) -> CacheWrite {
        let write = CacheWrite::from_result("upsert_vital", self.db.upsert_vital(reading).await);
        if write.stored {
            match self
                .db
                .enforce_vital_retention(&reading.patient_id, self.vitals_per_patient)
                .await
            {
                Ok(0) => {}
                Ok(removed) => log_debug!(
                    "evicted {removed} synced vitals for patient {}",
                    reading.patient_id
                ),
                Err(err) => log_warn!("vital retention failed: {err:#}"),
            }
        }
        write
    }

    pub async fn upsert_contact(&self, contact: &EmergencyContact) -> CacheWrite {
        CacheWrite::from_result("upsert_contact", self.db.upsert_contact(contact).await)
    }

    pub async fn upsert_medication(&self, medication: &Medication) -> CacheWrite {
        CacheWrite::from_result("upsert_medication", self.db.upsert_medication(medication).await)
    }

    pub async fn store_alert(&self, alert: &Alert) -> CacheWrite {
        CacheWrite::from_result("store_alert", self.db.store_alert(alert).await)
    }

    /// Caches the remote copy of a patient's contacts and medications for
    /// offline display.
    pub async fn cache_patient_snapshot(
        &self,
        patient_id: &str,
        contacts: &[EmergencyContact],
        medications: &[Medication],
    ) -> CacheWrite {
        let db = self.db.clone();
        let result = async {
            db.replace_contacts(patient_id, contacts).await?;
            db.replace_medications(patient_id, medications).await
        }
        .await;
        CacheWrite::from_result("cache_patient_snapshot", result)
    }
}

async fn read_or_default<T, F>(op: &str, fut: F) -> CacheRead<T>
where
    T: Default,
    F: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(value) => CacheRead::ok(value),
        Err(err) => {
            log_warn!("cache read '{op}' failed, serving empty result: {err:#}");
            CacheRead::fallback(T::default(), format!("{err:#}"))
        }
    }
}
