use serde::{Deserialize, Serialize};

use super::{Alert, EmergencyContact, Medication, VitalReading};

/// Local cache capacity, recomputed on demand.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub quota: u64,
    pub usage: u64,
    pub available: u64,
    pub percentage_used: f64,
}

impl StorageInfo {
    pub fn from_estimate(quota: u64, usage: u64) -> Self {
        if quota == 0 {
            return Self::default();
        }
        let usage = usage.min(quota);
        Self {
            quota,
            usage,
            available: quota - usage,
            percentage_used: usage as f64 / quota as f64 * 100.0,
        }
    }
}

/// Everything in the cache still waiting for remote confirmation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsyncedData {
    pub vitals: Vec<VitalReading>,
    pub contacts: Vec<EmergencyContact>,
    pub medications: Vec<Medication>,
    pub alerts: Vec<Alert>,
}

impl UnsyncedData {
    pub fn is_empty(&self) -> bool {
        self.vitals.is_empty()
            && self.contacts.is_empty()
            && self.medications.is_empty()
            && self.alerts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vitals.len() + self.contacts.len() + self.medications.len() + self.alerts.len()
    }
}

/// A cached record together with the local bookkeeping the sync engine needs
/// for its compare-and-set.
#[derive(Debug, Clone)]
pub struct Pending<T> {
    pub record: T,
    pub sync_version: i64,
    pub sync_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_quota_yields_zeroed_info() {
        assert_eq!(StorageInfo::from_estimate(0, 1234), StorageInfo::default());
    }

    #[test]
    fn percentage_is_computed_from_usage() {
        let info = StorageInfo::from_estimate(1_000, 250);
        assert_eq!(info.available, 750);
        assert!((info.percentage_used - 25.0).abs() < f64::EPSILON);
    }
}
