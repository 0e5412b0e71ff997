use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{bool_from_sql, format_datetime, to_u32},
    models::{ContactPriority, EmergencyContact, Pending},
};

use super::sync_state::PENDING_FILTER;

const CONTACT_COLUMNS: &str =
    "id, patient_id, name, relationship, phone, priority, synced, sync_version, sync_attempts";

fn row_to_contact(row: &Row) -> Result<EmergencyContact> {
    let priority: u8 = row.get("priority")?;
    let synced: i64 = row.get("synced")?;
    Ok(EmergencyContact {
        id: row.get("id")?,
        patient_id: row.get("patient_id")?,
        name: row.get("name")?,
        relationship: row.get("relationship")?,
        phone: row.get("phone")?,
        priority: ContactPriority::try_from(priority)?,
        synced: bool_from_sql(synced),
    })
}

impl Database {
    /// Local edit by the patient; queued for the remote store.
    pub async fn upsert_contact(&self, contact: &EmergencyContact) -> Result<()> {
        let record = contact.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO emergency_contacts (id, patient_id, name, relationship, phone, priority, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     relationship = excluded.relationship,
                     phone = excluded.phone,
                     priority = excluded.priority,
                     synced = 0,
                     sync_version = emergency_contacts.sync_version + 1,
                     sync_attempts = 0,
                     next_attempt_at = NULL,
                     last_sync_error = NULL",
                params![
                    record.id,
                    record.patient_id,
                    record.name,
                    record.relationship,
                    record.phone,
                    u8::from(record.priority),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Replaces the cached snapshot for a patient with the remote copy.
    /// Rows with pending local edits are left alone.
    pub async fn replace_contacts(&self, patient_id: &str, contacts: &[EmergencyContact]) -> Result<()> {
        let patient_id = patient_id.to_string();
        let contacts = contacts.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM emergency_contacts WHERE patient_id = ?1 AND synced = 1",
                params![patient_id],
            )?;
            for contact in &contacts {
                tx.execute(
                    "INSERT INTO emergency_contacts (id, patient_id, name, relationship, phone, priority, synced)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
                     ON CONFLICT(id) DO NOTHING",
                    params![
                        contact.id,
                        patient_id,
                        contact.name,
                        contact.relationship,
                        contact.phone,
                        u8::from(contact.priority),
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Ordered by priority, primary first.
    pub async fn get_emergency_contacts(&self, patient_id: &str) -> Result<Vec<EmergencyContact>> {
        let patient_id = patient_id.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {CONTACT_COLUMNS}
                 FROM emergency_contacts
                 WHERE patient_id = ?1
                 ORDER BY priority ASC, name ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![patient_id])?;
            let mut contacts = Vec::new();
            while let Some(row) = rows.next()? {
                contacts.push(row_to_contact(row)?);
            }
            Ok(contacts)
        })
        .await
    }

    pub async fn unsynced_contacts(&self) -> Result<Vec<EmergencyContact>> {
        self.execute(|conn| {
            let sql = format!(
                "SELECT {CONTACT_COLUMNS} FROM emergency_contacts WHERE synced = 0 ORDER BY id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut contacts = Vec::new();
            while let Some(row) = rows.next()? {
                contacts.push(row_to_contact(row)?);
            }
            Ok(contacts)
        })
        .await
    }

    pub async fn pending_contacts(
        &self,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Pending<EmergencyContact>>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {CONTACT_COLUMNS} FROM emergency_contacts WHERE {PENDING_FILTER} ORDER BY id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![max_attempts, format_datetime(&now)])?;
            let mut pending = Vec::new();
            while let Some(row) = rows.next()? {
                let sync_version: i64 = row.get("sync_version")?;
                let sync_attempts: i64 = row.get("sync_attempts")?;
                pending.push(Pending {
                    record: row_to_contact(row)?,
                    sync_version,
                    sync_attempts: to_u32(sync_attempts, "sync_attempts")?,
                });
            }
            Ok(pending)
        })
        .await
    }
}
