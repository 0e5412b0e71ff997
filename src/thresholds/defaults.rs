use chrono::Utc;

use crate::db::VitalType;

use super::{ThresholdConfig, ThresholdRange};

fn range(
    (critical_min, warning_min, min_value): (f64, f64, f64),
    (max_value, warning_max, critical_max): (f64, f64, f64),
    unit: &str,
    description: &str,
) -> ThresholdRange {
    ThresholdRange {
        min_value,
        max_value,
        warning_min,
        warning_max,
        critical_min,
        critical_max,
        unit: unit.into(),
        description: description.into(),
    }
}

/// Built-in bounds for one vital type.
pub fn default_range(vital: VitalType) -> ThresholdRange {
    match vital {
        VitalType::HeartRate => range(
            (40.0, 50.0, 60.0),
            (100.0, 110.0, 120.0),
            "bpm",
            "Resting heart rate in beats per minute",
        ),
        VitalType::BloodPressure => range(
            (70.0, 85.0, 90.0),
            (120.0, 140.0, 180.0),
            "mmHg",
            "Systolic blood pressure",
        ),
        VitalType::Temperature => range(
            (35.0, 35.5, 36.1),
            (37.2, 38.0, 39.5),
            "°C",
            "Core body temperature",
        ),
        VitalType::OxygenLevel => range(
            (85.0, 90.0, 95.0),
            (100.0, 100.0, 100.0),
            "%",
            "Peripheral oxygen saturation (SpO2)",
        ),
        VitalType::RespiratoryRate => range(
            (8.0, 10.0, 12.0),
            (20.0, 24.0, 30.0),
            "breaths/min",
            "Breaths per minute at rest",
        ),
        VitalType::BloodGlucose => range(
            (50.0, 60.0, 70.0),
            (140.0, 180.0, 250.0),
            "mg/dL",
            "Blood glucose concentration",
        ),
    }
}

pub fn default_config() -> ThresholdConfig {
    ThresholdConfig {
        thresholds: VitalType::ALL
            .into_iter()
            .map(|vital| (vital, default_range(vital)))
            .collect(),
        updated_at: Utc::now(),
    }
}
