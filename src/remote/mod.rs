//! Client side of the hosted document store. The core treats it as an
//! opaque persistence service keyed by collection and document id.

pub mod error;
pub mod http;
pub mod memory;
pub mod timeout;

use async_trait::async_trait;

use crate::{
    db::{Acknowledgment, Alert, EmergencyContact, Medication, PatientProfile, VitalReading},
    thresholds::ThresholdConfig,
};

pub use error::{RemoteError, RemoteResult};
pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;
pub use timeout::TimeoutRemote;

pub const VITALS_COLLECTION: &str = "vitals";
pub const CONTACTS_COLLECTION: &str = "emergencyContacts";
pub const MEDICATIONS_COLLECTION: &str = "medications";
pub const ALERTS_COLLECTION: &str = "alerts";
pub const PATIENTS_COLLECTION: &str = "patients";
pub const CONFIG_COLLECTION: &str = "config";
pub const THRESHOLDS_DOCUMENT: &str = "thresholds";

/// Writes are keyed by document id, so pushing the same record twice leaves
/// the store unchanged. Record pushes are upserts; alert pushes only create.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn put_vital(&self, reading: &VitalReading) -> RemoteResult<()>;

    async fn put_contact(&self, contact: &EmergencyContact) -> RemoteResult<()>;

    async fn put_medication(&self, medication: &Medication) -> RemoteResult<()>;

    async fn fetch_contacts(&self, patient_id: &str) -> RemoteResult<Vec<EmergencyContact>>;

    async fn fetch_medications(&self, patient_id: &str) -> RemoteResult<Vec<Medication>>;

    async fn fetch_patient(&self, patient_id: &str) -> RemoteResult<Option<PatientProfile>>;

    /// `None` when no configuration document exists yet.
    async fn load_thresholds(&self) -> RemoteResult<Option<ThresholdConfig>>;

    async fn save_thresholds(&self, config: &ThresholdConfig) -> RemoteResult<()>;

    /// Creates the alert document. An alert that already exists is left
    /// untouched and the call still succeeds, so a late or repeated push
    /// never reverts an acknowledgment.
    async fn put_alert(&self, alert: &Alert) -> RemoteResult<()>;

    /// Writes all acknowledgment fields in a single document update and
    /// returns the stored alert. Concurrent calls: last writer wins.
    async fn acknowledge_alert(
        &self,
        alert_id: &str,
        acknowledgment: &Acknowledgment,
    ) -> RemoteResult<Alert>;

    /// Alerts addressed to a doctor, newest first.
    async fn list_alerts(&self, doctor_id: &str) -> RemoteResult<Vec<Alert>>;
}
