use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{db::VitalType, remote::RemoteError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ThresholdError {
    #[error("{vital}: {field} is required")]
    MissingField { vital: VitalType, field: &'static str },
    #[error("{vital}: {field} must be a finite number")]
    NonFinite { vital: VitalType, field: &'static str },
    #[error("{vital}: bounds must satisfy criticalMin <= warningMin <= minValue <= maxValue <= warningMax <= criticalMax ({detail})")]
    BadNesting { vital: VitalType, detail: String },
    #[error("no threshold configured for {0}")]
    MissingVital(VitalType),
    #[error("threshold store unavailable: {0}")]
    Remote(#[from] RemoteError),
}

/// Bounds for one vital. Normal lies inside warning, which lies inside critical.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdRange {
    pub min_value: f64,
    pub max_value: f64,
    pub warning_min: f64,
    pub warning_max: f64,
    pub critical_min: f64,
    pub critical_max: f64,
    pub unit: String,
    pub description: String,
}

impl ThresholdRange {
    fn fields(&self) -> [(&'static str, f64); 6] {
        [
            ("criticalMin", self.critical_min),
            ("warningMin", self.warning_min),
            ("minValue", self.min_value),
            ("maxValue", self.max_value),
            ("warningMax", self.warning_max),
            ("criticalMax", self.critical_max),
        ]
    }

    pub fn validate(&self, vital: VitalType) -> Result<(), ThresholdError> {
        let fields = self.fields();
        if let Some(&(field, _)) = fields.iter().find(|(_, value)| !value.is_finite()) {
            return Err(ThresholdError::NonFinite { vital, field });
        }
        for pair in fields.windows(2) {
            let (lower_name, lower) = pair[0];
            let (upper_name, upper) = pair[1];
            if lower > upper {
                return Err(ThresholdError::BadNesting {
                    vital,
                    detail: format!("{lower_name} {lower} > {upper_name} {upper}"),
                });
            }
        }
        Ok(())
    }
}

/// Per-deployment configuration keyed by vital type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdConfig {
    pub thresholds: BTreeMap<VitalType, ThresholdRange>,
    pub updated_at: DateTime<Utc>,
}

impl ThresholdConfig {
    pub fn get(&self, vital: VitalType) -> Option<&ThresholdRange> {
        self.thresholds.get(&vital)
    }

    pub fn set(&mut self, vital: VitalType, range: ThresholdRange) {
        self.thresholds.insert(vital, range);
    }

    /// Every supported vital must be present and well-nested.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        for vital in VitalType::ALL {
            let range = self
                .thresholds
                .get(&vital)
                .ok_or(ThresholdError::MissingVital(vital))?;
            range.validate(vital)?;
        }
        Ok(())
    }
}

/// Admin edit form for one vital. Empty fields arrive as `None` and are
/// rejected instead of being read as zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ThresholdRangeInput {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub warning_min: Option<f64>,
    pub warning_max: Option<f64>,
    pub critical_min: Option<f64>,
    pub critical_max: Option<f64>,
    pub unit: String,
    pub description: String,
}

impl ThresholdRangeInput {
    pub fn into_range(self, vital: VitalType) -> Result<ThresholdRange, ThresholdError> {
        let require = |field: &'static str, value: Option<f64>| -> Result<f64, ThresholdError> {
            let value = value.ok_or(ThresholdError::MissingField { vital, field })?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(ThresholdError::NonFinite { vital, field })
            }
        };

        let range = ThresholdRange {
            min_value: require("minValue", self.min_value)?,
            max_value: require("maxValue", self.max_value)?,
            warning_min: require("warningMin", self.warning_min)?,
            warning_max: require("warningMax", self.warning_max)?,
            critical_min: require("criticalMin", self.critical_min)?,
            critical_max: require("criticalMax", self.critical_max)?,
            unit: self.unit,
            description: self.description,
        };
        range.validate(vital)?;
        Ok(range)
    }
}

impl From<&ThresholdRange> for ThresholdRangeInput {
    fn from(range: &ThresholdRange) -> Self {
        Self {
            min_value: Some(range.min_value),
            max_value: Some(range.max_value),
            warning_min: Some(range.warning_min),
            warning_max: Some(range.warning_max),
            critical_min: Some(range.critical_min),
            critical_max: Some(range.critical_max),
            unit: range.unit.clone(),
            description: range.description.clone(),
        }
    }
}
