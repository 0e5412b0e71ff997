use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{bool_from_sql, format_datetime, parse_datetime, to_i64, to_u32},
    models::{Pending, VitalReading, VitalValue},
};

use super::sync_state::PENDING_FILTER;

const VITAL_COLUMNS: &str =
    "id, patient_id, vital_type, value_json, unit, timestamp, synced, sync_version, sync_attempts";

fn row_to_vital(row: &Row) -> Result<VitalReading> {
    let vital_type: String = row.get("vital_type")?;
    let value_json: String = row.get("value_json")?;
    let timestamp: String = row.get("timestamp")?;
    let synced: i64 = row.get("synced")?;

    Ok(VitalReading {
        id: row.get("id")?,
        patient_id: row.get("patient_id")?,
        vital_type: vital_type.parse()?,
        value: serde_json::from_str::<VitalValue>(&value_json)
            .context("failed to decode vital value")?,
        unit: row.get("unit")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        synced: bool_from_sql(synced),
    })
}

fn row_to_pending_vital(row: &Row) -> Result<Pending<VitalReading>> {
    let sync_version: i64 = row.get("sync_version")?;
    let sync_attempts: i64 = row.get("sync_attempts")?;
    Ok(Pending {
        record: row_to_vital(row)?,
        sync_version,
        sync_attempts: to_u32(sync_attempts, "sync_attempts")?,
    })
}

impl Database {
    /// Inserts a reading as unsynced. Re-ingesting an identical reading is a
    /// no-op; a changed value bumps the version and clears the synced flag.
    pub async fn upsert_vital(&self, reading: &VitalReading) -> Result<()> {
        let record = reading.clone();
        self.execute(move |conn| {
            let value_json =
                serde_json::to_string(&record.value).context("failed to encode vital value")?;
            conn.execute(
                "INSERT INTO vitals (id, patient_id, vital_type, value_json, unit, timestamp, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
                 ON CONFLICT(id) DO UPDATE SET
                     value_json = excluded.value_json,
                     unit = excluded.unit,
                     synced = 0,
                     sync_version = vitals.sync_version + 1,
                     sync_attempts = 0,
                     next_attempt_at = NULL,
                     last_sync_error = NULL
                 WHERE vitals.value_json != excluded.value_json
                    OR vitals.unit != excluded.unit",
                params![
                    record.id,
                    record.patient_id,
                    record.vital_type.as_str(),
                    value_json,
                    record.unit,
                    format_datetime(&record.timestamp),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Most recent first.
    pub async fn get_patient_vitals(&self, patient_id: &str, limit: usize) -> Result<Vec<VitalReading>> {
        let patient_id = patient_id.to_string();
        let limit = to_i64(limit)?;
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {VITAL_COLUMNS}
                 FROM vitals
                 WHERE patient_id = ?1
                 ORDER BY timestamp DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![patient_id, limit])?;
            let mut vitals = Vec::new();
            while let Some(row) = rows.next()? {
                vitals.push(row_to_vital(row)?);
            }
            Ok(vitals)
        })
        .await
    }

    pub async fn unsynced_vitals(&self) -> Result<Vec<VitalReading>> {
        self.execute(|conn| {
            let sql = format!(
                "SELECT {VITAL_COLUMNS}
                 FROM vitals
                 WHERE synced = 0
                 ORDER BY timestamp ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut vitals = Vec::new();
            while let Some(row) = rows.next()? {
                vitals.push(row_to_vital(row)?);
            }
            Ok(vitals)
        })
        .await
    }

    /// Unsynced vitals due for a push, oldest first.
    pub async fn pending_vitals(
        &self,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Pending<VitalReading>>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {VITAL_COLUMNS}
                 FROM vitals
                 WHERE {PENDING_FILTER}
                 ORDER BY timestamp ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![max_attempts, format_datetime(&now)])?;
            let mut pending = Vec::new();
            while let Some(row) = rows.next()? {
                pending.push(row_to_pending_vital(row)?);
            }
            Ok(pending)
        })
        .await
    }

    /// Drops synced vitals beyond the newest `keep` for a patient. Unsynced
    /// readings are never evicted. Returns the number of rows removed.
    pub async fn enforce_vital_retention(&self, patient_id: &str, keep: usize) -> Result<usize> {
        let patient_id = patient_id.to_string();
        let keep = to_i64(keep)?;
        self.execute(move |conn| {
            let removed = conn.execute(
                "DELETE FROM vitals
                 WHERE patient_id = ?1
                   AND synced = 1
                   AND id NOT IN (
                       SELECT id FROM vitals
                       WHERE patient_id = ?1
                       ORDER BY timestamp DESC
                       LIMIT ?2
                   )",
                params![patient_id, keep],
            )?;
            Ok(removed)
        })
        .await
    }
}
