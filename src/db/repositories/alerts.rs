use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, to_i64, to_u32},
    models::{Alert, Pending},
};

use super::sync_state::PENDING_FILTER;

fn row_to_alert(row: &Row) -> Result<Alert> {
    let payload: String = row.get("payload_json")?;
    serde_json::from_str(&payload).context("failed to decode cached alert")
}

impl Database {
    /// Queues an alert raised on this device for the remote store.
    pub async fn store_alert(&self, alert: &Alert) -> Result<()> {
        let record = alert.clone();
        self.execute(move |conn| {
            let payload = serde_json::to_string(&record).context("failed to encode alert")?;
            conn.execute(
                "INSERT INTO alerts (id, patient_id, doctor_id, created_at, payload_json, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)
                 ON CONFLICT(id) DO UPDATE SET
                     payload_json = excluded.payload_json,
                     synced = 0,
                     sync_version = alerts.sync_version + 1,
                     sync_attempts = 0,
                     next_attempt_at = NULL,
                     last_sync_error = NULL",
                params![
                    record.id,
                    record.patient_id,
                    record.doctor_id,
                    format_datetime(&record.created_at),
                    payload,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Mirrors the remote copy of an alert (e.g. after acknowledgment)
    /// without disturbing a pending local write.
    pub async fn cache_remote_alert(&self, alert: &Alert) -> Result<()> {
        let record = alert.clone();
        self.execute(move |conn| {
            let payload = serde_json::to_string(&record).context("failed to encode alert")?;
            conn.execute(
                "INSERT INTO alerts (id, patient_id, doctor_id, created_at, payload_json, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)
                 ON CONFLICT(id) DO UPDATE SET
                     payload_json = excluded.payload_json
                 WHERE alerts.synced = 1",
                params![
                    record.id,
                    record.patient_id,
                    record.doctor_id,
                    format_datetime(&record.created_at),
                    payload,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Newest first; `doctor_id = None` lists every cached alert.
    pub async fn list_local_alerts(&self, doctor_id: Option<&str>, limit: usize) -> Result<Vec<Alert>> {
        let doctor_id = doctor_id.map(str::to_string);
        let limit = to_i64(limit)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload_json FROM alerts
                 WHERE (?1 IS NULL OR doctor_id = ?1)
                 ORDER BY created_at DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![doctor_id, limit])?;
            let mut alerts = Vec::new();
            while let Some(row) = rows.next()? {
                alerts.push(row_to_alert(row)?);
            }
            Ok(alerts)
        })
        .await
    }

    pub async fn unsynced_alerts(&self) -> Result<Vec<Alert>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT payload_json FROM alerts WHERE synced = 0 ORDER BY created_at ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut alerts = Vec::new();
            while let Some(row) = rows.next()? {
                alerts.push(row_to_alert(row)?);
            }
            Ok(alerts)
        })
        .await
    }

    pub async fn pending_alerts(
        &self,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Pending<Alert>>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT payload_json, sync_version, sync_attempts
                 FROM alerts
                 WHERE {PENDING_FILTER}
                 ORDER BY created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![max_attempts, format_datetime(&now)])?;
            let mut pending = Vec::new();
            while let Some(row) = rows.next()? {
                let sync_version: i64 = row.get("sync_version")?;
                let sync_attempts: i64 = row.get("sync_attempts")?;
                pending.push(Pending {
                    record: row_to_alert(row)?,
                    sync_version,
                    sync_attempts: to_u32(sync_attempts, "sync_attempts")?,
                });
            }
            Ok(pending)
        })
        .await
    }

    /// Rewrites the addressing of a queued alert once its patient is known.
    /// Only applies while the row is still unsynced at `sync_version`, so a
    /// concurrent local write wins.
    pub async fn readdress_alert(&self, alert: &Alert, sync_version: i64) -> Result<bool> {
        let record = alert.clone();
        self.execute(move |conn| {
            let payload = serde_json::to_string(&record).context("failed to encode alert")?;
            let changed = conn.execute(
                "UPDATE alerts SET payload_json = ?1, doctor_id = ?2
                 WHERE id = ?3 AND sync_version = ?4 AND synced = 0",
                params![payload, record.doctor_id, record.id, sync_version],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    /// Current version of a cached alert, used to flip its flag after an
    /// immediate push.
    pub async fn alert_sync_version(&self, id: &str) -> Result<Option<i64>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let version = conn
                .query_row(
                    "SELECT sync_version FROM alerts WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(version)
        })
        .await
    }
}
