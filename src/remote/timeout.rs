use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    db::{Acknowledgment, Alert, EmergencyContact, Medication, PatientProfile, VitalReading},
    thresholds::ThresholdConfig,
};

use super::{RemoteError, RemoteResult, RemoteStore};

/// Bounds every call on the wrapped store with the same deadline and turns
/// an expired deadline into `RemoteError::Timeout`.
#[derive(Clone)]
pub struct TimeoutRemote {
    inner: Arc<dyn RemoteStore>,
    timeout: Duration,
}

impl TimeoutRemote {
    pub fn new(inner: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, fut: F) -> RemoteResult<T>
    where
        F: Future<Output = RemoteResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl RemoteStore for TimeoutRemote {
    async fn put_vital(&self, reading: &VitalReading) -> RemoteResult<()> {
        self.bounded(self.inner.put_vital(reading)).await
    }

    async fn put_contact(&self, contact: &EmergencyContact) -> RemoteResult<()> {
        self.bounded(self.inner.put_contact(contact)).await
    }

    async fn put_medication(&self, medication: &Medication) -> RemoteResult<()> {
        self.bounded(self.inner.put_medication(medication)).await
    }

    async fn fetch_contacts(&self, patient_id: &str) -> RemoteResult<Vec<EmergencyContact>> {
        self.bounded(self.inner.fetch_contacts(patient_id)).await
    }

    async fn fetch_medications(&self, patient_id: &str) -> RemoteResult<Vec<Medication>> {
        self.bounded(self.inner.fetch_medications(patient_id)).await
    }

    async fn fetch_patient(&self, patient_id: &str) -> RemoteResult<Option<PatientProfile>> {
        self.bounded(self.inner.fetch_patient(patient_id)).await
    }

    async fn load_thresholds(&self) -> RemoteResult<Option<ThresholdConfig>> {
        self.bounded(self.inner.load_thresholds()).await
    }

    async fn save_thresholds(&self, config: &ThresholdConfig) -> RemoteResult<()> {
        self.bounded(self.inner.save_thresholds(config)).await
    }

    async fn put_alert(&self, alert: &Alert) -> RemoteResult<()> {
        self.bounded(self.inner.put_alert(alert)).await
    }

    async fn acknowledge_alert(
        &self,
        alert_id: &str,
        acknowledgment: &Acknowledgment,
    ) -> RemoteResult<Alert> {
        self.bounded(self.inner.acknowledge_alert(alert_id, acknowledgment))
            .await
    }

    async fn list_alerts(&self, doctor_id: &str) -> RemoteResult<Vec<Alert>> {
        self.bounded(self.inner.list_alerts(doctor_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;

    struct StalledStore;

    #[async_trait]
    impl RemoteStore for StalledStore {
        async fn put_vital(&self, _reading: &VitalReading) -> RemoteResult<()> {
            std::future::pending().await
        }
        async fn put_contact(&self, _contact: &EmergencyContact) -> RemoteResult<()> {
            std::future::pending().await
        }
        async fn put_medication(&self, _medication: &Medication) -> RemoteResult<()> {
            std::future::pending().await
        }
        async fn fetch_contacts(&self, _patient_id: &str) -> RemoteResult<Vec<EmergencyContact>> {
            std::future::pending().await
        }
        async fn fetch_medications(&self, _patient_id: &str) -> RemoteResult<Vec<Medication>> {
            std::future::pending().await
        }
        async fn fetch_patient(&self, _patient_id: &str) -> RemoteResult<Option<PatientProfile>> {
            std::future::pending().await
        }
        async fn load_thresholds(&self) -> RemoteResult<Option<ThresholdConfig>> {
            std::future::pending().await
        }
        async fn save_thresholds(&self, _config: &ThresholdConfig) -> RemoteResult<()> {
            std::future::pending().await
        }
        async fn put_alert(&self, _alert: &Alert) -> RemoteResult<()> {
            std::future::pending().await
        }
        async fn acknowledge_alert(
            &self,
            _alert_id: &str,
            _acknowledgment: &Acknowledgment,
        ) -> RemoteResult<Alert> {
            std::future::pending().await
        }
        async fn list_alerts(&self, _doctor_id: &str) -> RemoteResult<Vec<Alert>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_surfaces_timeout() {
        let remote = TimeoutRemote::new(Arc::new(StalledStore), Duration::from_secs(2));
        let err = remote.load_thresholds().await.unwrap_err();
        assert_eq!(err, RemoteError::Timeout(Duration::from_secs(2)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let remote = TimeoutRemote::new(Arc::new(MemoryRemoteStore::new()), Duration::from_secs(2));
        assert_eq!(remote.load_thresholds().await.unwrap(), None);
    }
}
