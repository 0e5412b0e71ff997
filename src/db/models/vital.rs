//! Vital reading data models.
//!
//! A reading is created on sensor ingestion or manual entry and is immutable
//! afterwards; only its `synced` flag changes.

use std::{fmt, str::FromStr};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum VitalType {
    HeartRate,
    BloodPressure,
    Temperature,
    OxygenLevel,
    RespiratoryRate,
    BloodGlucose,
}

impl VitalType {
    pub const ALL: [VitalType; 6] = [
        VitalType::HeartRate,
        VitalType::BloodPressure,
        VitalType::Temperature,
        VitalType::OxygenLevel,
        VitalType::RespiratoryRate,
        VitalType::BloodGlucose,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VitalType::HeartRate => "heartRate",
            VitalType::BloodPressure => "bloodPressure",
            VitalType::Temperature => "temperature",
            VitalType::OxygenLevel => "oxygenLevel",
            VitalType::RespiratoryRate => "respiratoryRate",
            VitalType::BloodGlucose => "bloodGlucose",
        }
    }

    /// Human-readable name used in alert messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            VitalType::HeartRate => "Heart Rate",
            VitalType::BloodPressure => "Blood Pressure",
            VitalType::Temperature => "Temperature",
            VitalType::OxygenLevel => "Oxygen Level",
            VitalType::RespiratoryRate => "Respiratory Rate",
            VitalType::BloodGlucose => "Blood Glucose",
        }
    }
}

impl fmt::Display for VitalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VitalType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        VitalType::ALL
            .into_iter()
            .find(|vital| vital.as_str() == value)
            .ok_or_else(|| anyhow!("unknown vital type '{value}'"))
    }
}

/// Measured value: most vitals are a single number, blood pressure is a pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum VitalValue {
    Scalar(f64),
    BloodPressure { systolic: f64, diastolic: f64 },
}

impl VitalValue {
    /// The component compared against thresholds (systolic for blood pressure).
    pub fn primary(&self) -> f64 {
        match *self {
            VitalValue::Scalar(value) => value,
            VitalValue::BloodPressure { systolic, .. } => systolic,
        }
    }

    pub fn is_finite(&self) -> bool {
        match *self {
            VitalValue::Scalar(value) => value.is_finite(),
            VitalValue::BloodPressure {
                systolic,
                diastolic,
            } => systolic.is_finite() && diastolic.is_finite(),
        }
    }
}

impl fmt::Display for VitalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            VitalValue::Scalar(value) => write!(f, "{value}"),
            VitalValue::BloodPressure {
                systolic,
                diastolic,
            } => write!(f, "{systolic}/{diastolic}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VitalReading {
    pub id: String,
    pub patient_id: String,
    pub vital_type: VitalType,
    pub value: VitalValue,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub synced: bool,
}

impl VitalReading {
    pub fn new(
        patient_id: impl Into<String>,
        vital_type: VitalType,
        value: VitalValue,
        unit: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let patient_id = patient_id.into();
        Self {
            id: reading_id(&patient_id, vital_type, timestamp),
            patient_id,
            vital_type,
            value,
            unit: unit.into(),
            timestamp,
            synced: false,
        }
    }
}

/// Readings are keyed by patient, vital and timestamp so a replayed feed
/// event upserts the same row.
pub fn reading_id(patient_id: &str, vital_type: VitalType, timestamp: DateTime<Utc>) -> String {
    format!(
        "{patient_id}:{}:{}",
        vital_type.as_str(),
        timestamp.timestamp_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn blood_pressure_value_round_trips_untagged() {
        let json = r#"{"systolic":128.0,"diastolic":82.0}"#;
        let value: VitalValue = serde_json::from_str(json).unwrap();
        assert_eq!(
            value,
            VitalValue::BloodPressure {
                systolic: 128.0,
                diastolic: 82.0
            }
        );
        assert_eq!(value.primary(), 128.0);

        let scalar: VitalValue = serde_json::from_str("72.5").unwrap();
        assert_eq!(scalar, VitalValue::Scalar(72.5));
    }

    #[test]
    fn reading_id_is_stable_for_the_same_event() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        let a = VitalReading::new("p1", VitalType::HeartRate, VitalValue::Scalar(70.0), "bpm", ts);
        let b = VitalReading::new("p1", VitalType::HeartRate, VitalValue::Scalar(71.0), "bpm", ts);
        assert_eq!(a.id, b.id);
        assert!(a.id.starts_with("p1:heartRate:"));
        assert!(!a.synced);
    }

    #[test]
    fn vital_type_parses_camel_case_names() {
        assert_eq!("oxygenLevel".parse::<VitalType>().unwrap(), VitalType::OxygenLevel);
        assert!("pulse".parse::<VitalType>().is_err());
    }
}
