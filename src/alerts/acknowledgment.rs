use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::{
    db::{Acknowledgment, Alert, Database},
    remote::{RemoteError, RemoteStore},
};

const ENABLE_LOGS: bool = true;
const LOCAL_ALERT_LIMIT: usize = 200;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AckError {
    #[error("alert id is required")]
    MissingAlertId,
    #[error("doctor id and name are required")]
    MissingDoctor,
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Result of one acknowledgment attempt. Callers update their view only on
/// `Acknowledged`.
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    Acknowledged(Alert),
    Failed { alert_id: String, error: AckError },
}

impl AckOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AckOutcome::Acknowledged(_))
    }

    pub fn alert_id(&self) -> &str {
        match self {
            AckOutcome::Acknowledged(alert) => &alert.id,
            AckOutcome::Failed { alert_id, .. } => alert_id,
        }
    }
}

/// Records doctors' acknowledgments on the remote alert. There is no
/// locking between doctors: concurrent acknowledgments resolve to whichever
/// write lands last, always as a whole `Acknowledgment`.
pub struct AckTracker {
    remote: Arc<dyn RemoteStore>,
    db: Database,
}

impl AckTracker {
    pub fn new(remote: Arc<dyn RemoteStore>, db: Database) -> Self {
        Self { remote, db }
    }

    pub async fn acknowledge_alert(
        &self,
        alert_id: &str,
        doctor_id: &str,
        doctor_name: &str,
    ) -> AckOutcome {
        let failed = |error: AckError| AckOutcome::Failed {
            alert_id: alert_id.to_string(),
            error,
        };
        if alert_id.trim().is_empty() {
            return failed(AckError::MissingAlertId);
        }
        if doctor_id.trim().is_empty() || doctor_name.trim().is_empty() {
            return failed(AckError::MissingDoctor);
        }

        let acknowledgment = Acknowledgment {
            acknowledged_by: doctor_id.to_string(),
            acknowledged_by_name: doctor_name.to_string(),
            acknowledged_at: Utc::now(),
        };

        match self.remote.acknowledge_alert(alert_id, &acknowledgment).await {
            Ok(alert) => {
                log_info!("alert {alert_id} acknowledged by {doctor_id}");
                if let Err(err) = self.db.cache_remote_alert(&alert).await {
                    log_warn!("failed to cache acknowledged alert {alert_id}: {err:#}");
                }
                AckOutcome::Acknowledged(alert)
            }
            Err(err) => {
                log_warn!("acknowledging alert {alert_id} failed: {err}");
                failed(err.into())
            }
        }
    }

    /// A doctor's alerts, newest first. Falls back to the locally cached
    /// copies when the remote store cannot be reached.
    pub async fn list_alerts(&self, doctor_id: &str) -> Result<Vec<Alert>, AckError> {
        match self.remote.list_alerts(doctor_id).await {
            Ok(alerts) => {
                for alert in &alerts {
                    if let Err(err) = self.db.cache_remote_alert(alert).await {
                        log_warn!("failed to cache alert {}: {err:#}", alert.id);
                        break;
                    }
                }
                Ok(alerts)
            }
            Err(err) if err.is_transient() => {
                log_warn!("listing alerts for {doctor_id} from local cache: {err}");
                self.db
                    .list_local_alerts(Some(doctor_id), LOCAL_ALERT_LIMIT)
                    .await
                    .map_err(|_| AckError::Remote(err))
            }
            Err(err) => Err(err.into()),
        }
    }
}

pub fn unacknowledged_count(alerts: &[Alert]) -> usize {
    alerts.iter().filter(|alert| !alert.acknowledged).count()
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboxEntry {
    pub alert: Alert,
    /// Last acknowledgment failure, shown next to the alert until a retry
    /// succeeds.
    pub error: Option<String>,
}

/// A doctor's view of their alerts.
#[derive(Debug, Clone)]
pub struct AlertInbox {
    doctor_id: String,
    doctor_name: String,
    entries: Vec<InboxEntry>,
}

impl AlertInbox {
    pub fn new(doctor_id: impl Into<String>, doctor_name: impl Into<String>, alerts: Vec<Alert>) -> Self {
        let mut inbox = Self {
            doctor_id: doctor_id.into(),
            doctor_name: doctor_name.into(),
            entries: Vec::with_capacity(alerts.len()),
        };
        for alert in alerts {
            inbox.receive(alert);
        }
        inbox
    }

    pub async fn load(tracker: &AckTracker, doctor_id: &str, doctor_name: &str) -> Result<Self, AckError> {
        let alerts = tracker.list_alerts(doctor_id).await?;
        Ok(Self::new(doctor_id, doctor_name, alerts))
    }

    pub fn entries(&self) -> &[InboxEntry] {
        &self.entries
    }

    pub fn get(&self, alert_id: &str) -> Option<&InboxEntry> {
        self.entries.iter().find(|entry| entry.alert.id == alert_id)
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.alert.acknowledged)
            .count()
    }

    /// Adds or refreshes an alert from the live stream. Alerts addressed to
    /// other doctors are ignored.
    pub fn receive(&mut self, alert: Alert) -> bool {
        if alert.doctor_id.as_deref() != Some(self.doctor_id.as_str()) {
            return false;
        }
        match self.entries.iter_mut().find(|entry| entry.alert.id == alert.id) {
            Some(entry) => entry.alert = alert,
            None => {
                let position = self
                    .entries
                    .iter()
                    .position(|entry| entry.alert.created_at < alert.created_at)
                    .unwrap_or(self.entries.len());
                self.entries
                    .insert(position, InboxEntry { alert, error: None });
            }
        }
        true
    }

    /// Acknowledges through the tracker and applies the outcome.
    pub async fn acknowledge(&mut self, tracker: &AckTracker, alert_id: &str) -> AckOutcome {
        let outcome = tracker
            .acknowledge_alert(alert_id, &self.doctor_id, &self.doctor_name)
            .await;
        self.apply(&outcome);
        outcome
    }

    /// Success replaces the alert and clears any inline error; failure leaves
    /// the alert untouched and records the error.
    pub fn apply(&mut self, outcome: &AckOutcome) {
        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.alert.id == outcome.alert_id())
        else {
            return;
        };
        match outcome {
            AckOutcome::Acknowledged(alert) => {
                entry.alert = alert.clone();
                entry.error = None;
            }
            AckOutcome::Failed { error, .. } => {
                entry.error = Some(error.to_string());
            }
        }
    }
}
