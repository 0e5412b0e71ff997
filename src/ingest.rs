//! Live vital-reading feed: one JSON object per event.
//!
//! ```json
//! {"patientId":"p1","vitalType":"heartRate","value":118,"unit":"bpm","timestamp":"2024-05-01T12:00:00Z"}
//! {"patientId":"p1","vitalType":"bloodPressure","value":{"systolic":150,"diastolic":95},"timestamp":"2024-05-01T12:00:05Z"}
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    alerts::AlertEvaluator,
    cache::{CacheStore, CacheWrite},
    db::{Alert, VitalReading, VitalType, VitalValue},
    sync::SyncEngine,
};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedEvent {
    pub patient_id: String,
    pub vital_type: VitalType,
    pub value: VitalValue,
    /// Defaults to the unit of the configured threshold.
    #[serde(default)]
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed feed event: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("feed event has an empty patient id")]
    MissingPatient,
    #[error("{0} reading must be finite")]
    NonFinite(VitalType),
    #[error("{vital} reading has the wrong shape: {value}")]
    WrongShape { vital: VitalType, value: VitalValue },
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub reading: VitalReading,
    pub cached: CacheWrite,
    pub alert: Option<Alert>,
}

pub fn parse_event(line: &str) -> Result<FeedEvent, IngestError> {
    Ok(serde_json::from_str(line)?)
}

/// Caches each reading as unsynced, evaluates it, and nudges the sync engine
/// when online.
pub struct Ingestor {
    cache: CacheStore,
    evaluator: Arc<AlertEvaluator>,
    sync: Option<SyncEngine>,
}

impl Ingestor {
    pub fn new(cache: CacheStore, evaluator: Arc<AlertEvaluator>) -> Self {
        Self {
            cache,
            evaluator,
            sync: None,
        }
    }

    pub fn with_sync(mut self, engine: SyncEngine) -> Self {
        self.sync = Some(engine);
        self
    }

    pub async fn ingest_line(&self, line: &str) -> Result<IngestOutcome, IngestError> {
        self.ingest(parse_event(line)?).await
    }

    pub async fn ingest(&self, event: FeedEvent) -> Result<IngestOutcome, IngestError> {
        validate(&event)?;
        let unit = match event.unit {
            Some(unit) => unit,
            None => self
                .evaluator
                .registry()
                .range_for(event.vital_type)
                .map(|range| range.unit)
                .unwrap_or_default(),
        };
        let reading = VitalReading::new(
            event.patient_id,
            event.vital_type,
            event.value,
            unit,
            event.timestamp,
        );

        let cached = self.cache.upsert_vital(&reading).await;
        let alert = self.evaluator.process_reading(&reading).await;

        if let Some(engine) = &self.sync {
            if engine.is_online() {
                let engine = engine.clone();
                tokio::spawn(async move {
                    let report = engine.sync_data().await;
                    log_debug!("post-ingest sync: {:?}", report.outcome);
                });
            }
        }

        Ok(IngestOutcome {
            reading,
            cached,
            alert,
        })
    }
}

fn validate(event: &FeedEvent) -> Result<(), IngestError> {
    if event.patient_id.trim().is_empty() {
        return Err(IngestError::MissingPatient);
    }
    if !event.value.is_finite() {
        return Err(IngestError::NonFinite(event.vital_type));
    }
    let blood_pressure = event.vital_type == VitalType::BloodPressure;
    let structured = matches!(event.value, VitalValue::BloodPressure { .. });
    if blood_pressure != structured {
        return Err(IngestError::WrongShape {
            vital: event.vital_type,
            value: event.value,
        });
    }
    Ok(())
}
