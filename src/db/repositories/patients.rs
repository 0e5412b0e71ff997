use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::{connection::Database, helpers::format_datetime, models::PatientProfile};

impl Database {
    /// Remembers the latest remote profile for offline addressing.
    pub async fn upsert_patient(&self, profile: &PatientProfile) -> Result<()> {
        let record = profile.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO patients (id, name, assigned_doctor_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     assigned_doctor_id = excluded.assigned_doctor_id,
                     updated_at = excluded.updated_at",
                params![
                    record.id,
                    record.name,
                    record.assigned_doctor_id,
                    format_datetime(&Utc::now()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_patient(&self, id: &str) -> Result<Option<PatientProfile>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let profile = conn
                .query_row(
                    "SELECT id, name, assigned_doctor_id FROM patients WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(PatientProfile {
                            id: row.get("id")?,
                            name: row.get("name")?,
                            assigned_doctor_id: row.get("assigned_doctor_id")?,
                        })
                    },
                )
                .optional()?;
            Ok(profile)
        })
        .await
    }
}
