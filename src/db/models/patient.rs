use serde::{Deserialize, Serialize};

/// Minimal patient record used to address alerts to the assigned doctor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    pub id: String,
    pub name: String,
    pub assigned_doctor_id: Option<String>,
}
