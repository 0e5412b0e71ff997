use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;

use crate::{
    db::{Acknowledgment, Alert, EmergencyContact, Medication, PatientProfile, VitalReading},
    thresholds::ThresholdConfig,
};

use super::{
    RemoteError, RemoteResult, RemoteStore, ALERTS_COLLECTION, CONFIG_COLLECTION,
    CONTACTS_COLLECTION, MEDICATIONS_COLLECTION, THRESHOLDS_DOCUMENT, VITALS_COLLECTION,
};

#[derive(Default)]
struct MemoryState {
    vitals: HashMap<String, VitalReading>,
    contacts: HashMap<String, EmergencyContact>,
    medications: HashMap<String, Medication>,
    patients: HashMap<String, PatientProfile>,
    alerts: HashMap<String, Alert>,
    thresholds: Option<ThresholdConfig>,
    /// Write requests received per `collection/id`.
    writes: HashMap<String, usize>,
}

impl MemoryState {
    fn count_write(&mut self, collection: &str, id: &str) {
        *self.writes.entry(format!("{collection}/{id}")).or_default() += 1;
    }
}

/// In-process document store. Used when no remote URL is configured and as
/// the backing store in tests.
#[derive(Default)]
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert_patient(&self, patient: PatientProfile) {
        self.lock().patients.insert(patient.id.clone(), patient);
    }

    pub fn vitals(&self) -> Vec<VitalReading> {
        let mut vitals: Vec<_> = self.lock().vitals.values().cloned().collect();
        vitals.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        vitals
    }

    pub fn contacts(&self) -> Vec<EmergencyContact> {
        self.lock().contacts.values().cloned().collect()
    }

    pub fn medications(&self) -> Vec<Medication> {
        self.lock().medications.values().cloned().collect()
    }

    pub fn alert(&self, id: &str) -> Option<Alert> {
        self.lock().alerts.get(id).cloned()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<_> = self.lock().alerts.values().cloned().collect();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        alerts
    }

    pub fn thresholds(&self) -> Option<ThresholdConfig> {
        self.lock().thresholds.clone()
    }

    /// How many write requests reached `collection/id`.
    pub fn write_count(&self, collection: &str, id: &str) -> usize {
        self.lock()
            .writes
            .get(&format!("{collection}/{id}"))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_writes(&self) -> usize {
        self.lock().writes.values().sum()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn put_vital(&self, reading: &VitalReading) -> RemoteResult<()> {
        let mut state = self.lock();
        state.count_write(VITALS_COLLECTION, &reading.id);
        let stored = VitalReading {
            synced: true,
            ..reading.clone()
        };
        state.vitals.insert(reading.id.clone(), stored);
        Ok(())
    }

    async fn put_contact(&self, contact: &EmergencyContact) -> RemoteResult<()> {
        let mut state = self.lock();
        state.count_write(CONTACTS_COLLECTION, &contact.id);
        let stored = EmergencyContact {
            synced: true,
            ..contact.clone()
        };
        state.contacts.insert(contact.id.clone(), stored);
        Ok(())
    }

    async fn put_medication(&self, medication: &Medication) -> RemoteResult<()> {
        let mut state = self.lock();
        state.count_write(MEDICATIONS_COLLECTION, &medication.id);
        let stored = Medication {
            synced: true,
            ..medication.clone()
        };
        state.medications.insert(medication.id.clone(), stored);
        Ok(())
    }

    async fn fetch_contacts(&self, patient_id: &str) -> RemoteResult<Vec<EmergencyContact>> {
        let mut contacts: Vec<_> = self
            .lock()
            .contacts
            .values()
            .filter(|contact| contact.patient_id == patient_id)
            .cloned()
            .collect();
        contacts.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(contacts)
    }

    async fn fetch_medications(&self, patient_id: &str) -> RemoteResult<Vec<Medication>> {
        let mut medications: Vec<_> = self
            .lock()
            .medications
            .values()
            .filter(|medication| medication.patient_id == patient_id)
            .cloned()
            .collect();
        medications.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(medications)
    }

    async fn fetch_patient(&self, patient_id: &str) -> RemoteResult<Option<PatientProfile>> {
        Ok(self.lock().patients.get(patient_id).cloned())
    }

    async fn load_thresholds(&self) -> RemoteResult<Option<ThresholdConfig>> {
        Ok(self.lock().thresholds.clone())
    }

    async fn save_thresholds(&self, config: &ThresholdConfig) -> RemoteResult<()> {
        let mut state = self.lock();
        state.count_write(CONFIG_COLLECTION, THRESHOLDS_DOCUMENT);
        state.thresholds = Some(config.clone());
        Ok(())
    }

    async fn put_alert(&self, alert: &Alert) -> RemoteResult<()> {
        let mut state = self.lock();
        state.count_write(ALERTS_COLLECTION, &alert.id);
        state
            .alerts
            .entry(alert.id.clone())
            .or_insert_with(|| alert.clone());
        Ok(())
    }

    async fn acknowledge_alert(
        &self,
        alert_id: &str,
        acknowledgment: &Acknowledgment,
    ) -> RemoteResult<Alert> {
        let mut state = self.lock();
        state.count_write(ALERTS_COLLECTION, alert_id);
        let alert = state
            .alerts
            .get_mut(alert_id)
            .ok_or_else(|| RemoteError::NotFound {
                collection: ALERTS_COLLECTION.into(),
                id: alert_id.into(),
            })?;
        alert.apply_acknowledgment(acknowledgment.clone());
        Ok(alert.clone())
    }

    async fn list_alerts(&self, doctor_id: &str) -> RemoteResult<Vec<Alert>> {
        let mut alerts: Vec<_> = self
            .lock()
            .alerts
            .values()
            .filter(|alert| alert.doctor_id.as_deref() == Some(doctor_id))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }
}
