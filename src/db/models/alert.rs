//! Alert data models.
//!
//! Alerts are created by the evaluator when a reading leaves its normal
//! range, mutated once by a doctor's acknowledgment and never deleted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VitalType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who acknowledged an alert and when. The three fields travel as one value
/// so an alert can never carry a mix of two doctors' acknowledgments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgment {
    pub acknowledged_by: String,
    pub acknowledged_by_name: String,
    pub acknowledged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub doctor_id: Option<String>,
    pub vital_type: VitalType,
    pub vital_name: String,
    pub current_value: f64,
    pub unit: String,
    pub severity: Severity,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    #[serde(flatten)]
    pub acknowledgment: Option<Acknowledgment>,
}

impl Alert {
    pub fn apply_acknowledgment(&mut self, acknowledgment: Acknowledgment) {
        self.acknowledged = true;
        self.acknowledgment = Some(acknowledgment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_alert() -> Alert {
        Alert {
            id: "a1".into(),
            patient_id: "p1".into(),
            patient_name: "Ada".into(),
            doctor_id: Some("d1".into()),
            vital_type: VitalType::HeartRate,
            vital_name: "Heart Rate".into(),
            current_value: 125.0,
            unit: "bpm".into(),
            severity: Severity::Critical,
            message: "Heart Rate is 125 bpm".into(),
            created_at: Utc::now(),
            acknowledged: false,
            acknowledgment: None,
        }
    }

    #[test]
    fn acknowledgment_fields_are_flattened() {
        let mut alert = sample_alert();
        alert.apply_acknowledgment(Acknowledgment {
            acknowledged_by: "d2".into(),
            acknowledged_by_name: "Dr. Grey".into(),
            acknowledged_at: Utc::now(),
        });

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["acknowledged"], true);
        assert_eq!(json["acknowledgedBy"], "d2");
        assert_eq!(json["acknowledgedByName"], "Dr. Grey");
        assert_eq!(json["severity"], "critical");

        let back: Alert = serde_json::from_value(json).unwrap();
        assert_eq!(back, alert);
    }

    #[test]
    fn unacknowledged_alert_deserializes_without_ack_fields() {
        let alert = sample_alert();
        let json = serde_json::to_string(&alert).unwrap();
        let back: Alert = serde_json::from_str(&json).unwrap();
        assert!(back.acknowledgment.is_none());
        assert!(!back.acknowledged);
    }
}
