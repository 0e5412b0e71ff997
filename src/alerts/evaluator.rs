use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    cache::CacheStore,
    db::{Alert, Severity, SyncTable, VitalReading},
    remote::RemoteStore,
    thresholds::{ThresholdRange, ThresholdRegistry},
};

use super::{notifier::NotificationSink, recipients::PatientDirectory};

const ENABLE_LOGS: bool = true;
const ALERT_CHANNEL_CAPACITY: usize = 64;

use crate::{log_debug, log_info, log_warn};

/// Classifies a value against a range. Every bound is inclusive: a value on
/// `min_value`/`max_value` is normal and a value on
/// `critical_min`/`critical_max` is still a warning. Only values beyond the
/// critical bounds are critical.
pub fn classify(value: f64, range: &ThresholdRange) -> Option<Severity> {
    if (range.min_value..=range.max_value).contains(&value) {
        None
    } else if (range.critical_min..=range.critical_max).contains(&value) {
        Some(Severity::Warning)
    } else {
        Some(Severity::Critical)
    }
}

fn alert_message(reading: &VitalReading, severity: Severity, range: &ThresholdRange) -> String {
    format!(
        "{} {} {} is {} (normal range {}-{} {})",
        reading.vital_type.display_name(),
        reading.value,
        reading.unit,
        severity,
        range.min_value,
        range.max_value,
        range.unit
    )
}

/// Turns breaching readings into alerts. Every breaching reading produces
/// its own alert.
pub struct AlertEvaluator {
    registry: Arc<ThresholdRegistry>,
    cache: CacheStore,
    remote: Arc<dyn RemoteStore>,
    notifier: Arc<dyn NotificationSink>,
    alerts_tx: broadcast::Sender<Alert>,
    patients: Arc<PatientDirectory>,
}

impl AlertEvaluator {
    pub fn new(
        registry: Arc<ThresholdRegistry>,
        cache: CacheStore,
        remote: Arc<dyn RemoteStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let patients = Arc::new(PatientDirectory::new(
            Arc::clone(&remote),
            cache.database().clone(),
        ));
        Self::with_directory(registry, cache, remote, notifier, patients)
    }

    /// Shares one patient directory with the sync engine.
    pub fn with_directory(
        registry: Arc<ThresholdRegistry>,
        cache: CacheStore,
        remote: Arc<dyn RemoteStore>,
        notifier: Arc<dyn NotificationSink>,
        patients: Arc<PatientDirectory>,
    ) -> Self {
        let (alerts_tx, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self {
            registry,
            cache,
            remote,
            notifier,
            alerts_tx,
            patients,
        }
    }

    pub fn registry(&self) -> &ThresholdRegistry {
        &self.registry
    }

    /// Live stream of newly raised alerts.
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.alerts_tx.subscribe()
    }

    /// Evaluates one reading. Returns the alert it raised, if any. Storage
    /// and remote failures are logged; the alert is still published.
    pub async fn process_reading(&self, reading: &VitalReading) -> Option<Alert> {
        let range = match self.registry.range_for(reading.vital_type) {
            Some(range) => range,
            None => {
                log_warn!("no threshold configured for {}", reading.vital_type);
                return None;
            }
        };

        let value = reading.value.primary();
        if !value.is_finite() {
            log_warn!("ignoring non-finite reading {}", reading.id);
            return None;
        }
        let severity = classify(value, &range)?;

        let alert = self.build_alert(reading, severity, &range).await;
        log_info!(
            "{} alert {} for patient {}: {}",
            severity,
            alert.id,
            alert.patient_id,
            alert.message
        );

        let write = self.cache.store_alert(&alert).await;
        self.push(&alert, write.stored).await;

        // No receivers is fine; the alert is persisted either way.
        let _ = self.alerts_tx.send(alert.clone());
        if let Err(err) = self.notifier.notify(&alert) {
            log_debug!("notification for alert {} dropped: {err:#}", alert.id);
        }
        Some(alert)
    }

    async fn build_alert(&self, reading: &VitalReading, severity: Severity, range: &ThresholdRange) -> Alert {
        let patient = self.patients.lookup(&reading.patient_id).await;
        Alert {
            id: Uuid::new_v4().to_string(),
            patient_id: reading.patient_id.clone(),
            patient_name: patient
                .as_ref()
                .map(|profile| profile.name.clone())
                .unwrap_or_else(|| reading.patient_id.clone()),
            doctor_id: patient.and_then(|profile| profile.assigned_doctor_id),
            vital_type: reading.vital_type,
            vital_name: reading.vital_type.display_name().to_string(),
            current_value: reading.value.primary(),
            unit: reading.unit.clone(),
            severity,
            message: alert_message(reading, severity, range),
            created_at: Utc::now(),
            acknowledged: false,
            acknowledgment: None,
        }
    }

    /// Pushes the alert right away; on failure it stays queued for the sync
    /// engine.
    async fn push(&self, alert: &Alert, stored_locally: bool) {
        if let Err(err) = self.remote.put_alert(alert).await {
            log_warn!("alert {} queued for sync: {err}", alert.id);
            return;
        }
        if !stored_locally {
            return;
        }

        let db = self.cache.database();
        let flipped = match db.alert_sync_version(&alert.id).await {
            Ok(Some(version)) => db.mark_synced(SyncTable::Alerts, &alert.id, version).await,
            Ok(None) => Ok(false),
            Err(err) => Err(err),
        };
        if let Err(err) = flipped {
            log_warn!("failed to mark alert {} synced: {err:#}", alert.id);
        }
    }
}
