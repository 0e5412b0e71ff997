use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{bool_from_sql, format_datetime, to_u32},
    models::{Medication, Pending},
};

use super::sync_state::PENDING_FILTER;

const MEDICATION_COLUMNS: &str =
    "id, patient_id, name, dosage, schedule, synced, sync_version, sync_attempts";

fn row_to_medication(row: &Row) -> Result<Medication, rusqlite::Error> {
    let synced: i64 = row.get("synced")?;
    Ok(Medication {
        id: row.get("id")?,
        patient_id: row.get("patient_id")?,
        name: row.get("name")?,
        dosage: row.get("dosage")?,
        schedule: row.get("schedule")?,
        synced: bool_from_sql(synced),
    })
}

impl Database {
    pub async fn upsert_medication(&self, medication: &Medication) -> Result<()> {
        let record = medication.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO medications (id, patient_id, name, dosage, schedule, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     dosage = excluded.dosage,
                     schedule = excluded.schedule,
                     synced = 0,
                     sync_version = medications.sync_version + 1,
                     sync_attempts = 0,
                     next_attempt_at = NULL,
                     last_sync_error = NULL",
                params![
                    record.id,
                    record.patient_id,
                    record.name,
                    record.dosage,
                    record.schedule,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Replaces the cached snapshot for a patient, keeping rows with pending local edits.
    pub async fn replace_medications(&self, patient_id: &str, medications: &[Medication]) -> Result<()> {
        let patient_id = patient_id.to_string();
        let medications = medications.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM medications WHERE patient_id = ?1 AND synced = 1",
                params![patient_id],
            )?;
            for medication in &medications {
                tx.execute(
                    "INSERT INTO medications (id, patient_id, name, dosage, schedule, synced)
                     VALUES (?1, ?2, ?3, ?4, ?5, 1)
                     ON CONFLICT(id) DO NOTHING",
                    params![
                        medication.id,
                        patient_id,
                        medication.name,
                        medication.dosage,
                        medication.schedule,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn get_medications(&self, patient_id: &str) -> Result<Vec<Medication>> {
        let patient_id = patient_id.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {MEDICATION_COLUMNS} FROM medications WHERE patient_id = ?1 ORDER BY name ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let medications = stmt
                .query_map(params![patient_id], row_to_medication)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(medications)
        })
        .await
    }

    pub async fn unsynced_medications(&self) -> Result<Vec<Medication>> {
        self.execute(|conn| {
            let sql =
                format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE synced = 0 ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let medications = stmt
                .query_map([], row_to_medication)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(medications)
        })
        .await
    }

    pub async fn pending_medications(
        &self,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Pending<Medication>>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {MEDICATION_COLUMNS} FROM medications WHERE {PENDING_FILTER} ORDER BY id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![max_attempts, format_datetime(&now)])?;
            let mut pending = Vec::new();
            while let Some(row) = rows.next()? {
                let sync_version: i64 = row.get("sync_version")?;
                let sync_attempts: i64 = row.get("sync_attempts")?;
                pending.push(Pending {
                    record: row_to_medication(row)?,
                    sync_version,
                    sync_attempts: to_u32(sync_attempts, "sync_attempts")?,
                });
            }
            Ok(pending)
        })
        .await
    }
}
