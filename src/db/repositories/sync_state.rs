use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::db::{
    connection::Database,
    helpers::format_datetime,
};

/// Cached tables that take part in synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTable {
    Vitals,
    Contacts,
    Medications,
    Alerts,
}

impl SyncTable {
    pub const ALL: [SyncTable; 4] = [
        SyncTable::Vitals,
        SyncTable::Contacts,
        SyncTable::Medications,
        SyncTable::Alerts,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            SyncTable::Vitals => "vitals",
            SyncTable::Contacts => "emergency_contacts",
            SyncTable::Medications => "medications",
            SyncTable::Alerts => "alerts",
        }
    }
}

/// WHERE fragment selecting rows due for a push; `?1` is the attempt cap and
/// `?2` the current time.
pub(crate) const PENDING_FILTER: &str = "synced = 0
    AND sync_attempts < ?1
    AND (next_attempt_at IS NULL OR next_attempt_at <= ?2)";

impl Database {
    /// Flips `synced` only if the row still holds the version that was pushed.
    /// Returns `false` when a newer local write raced the push.
    pub async fn mark_synced(&self, table: SyncTable, id: &str, sync_version: i64) -> Result<bool> {
        let id = id.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "UPDATE {}
                 SET synced = 1,
                     sync_attempts = 0,
                     next_attempt_at = NULL,
                     last_sync_error = NULL
                 WHERE id = ?1 AND sync_version = ?2 AND synced = 0",
                table.table_name()
            );
            let rows = conn.execute(&sql, params![id, sync_version])?;
            Ok(rows == 1)
        })
        .await
    }

    pub async fn record_sync_failure(
        &self,
        table: SyncTable,
        id: &str,
        sync_version: i64,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        let id = id.to_string();
        let error = error.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "UPDATE {}
                 SET sync_attempts = sync_attempts + 1,
                     next_attempt_at = ?1,
                     last_sync_error = ?2
                 WHERE id = ?3 AND sync_version = ?4 AND synced = 0",
                table.table_name()
            );
            conn.execute(
                &sql,
                params![format_datetime(&next_attempt_at), error, id, sync_version],
            )?;
            Ok(())
        })
        .await
    }

    /// Unsynced rows that exhausted their attempts.
    pub async fn parked_count(&self, max_attempts: u32) -> Result<usize> {
        self.execute(move |conn| {
            let mut total = 0usize;
            for table in SyncTable::ALL {
                let sql = format!(
                    "SELECT COUNT(*) FROM {} WHERE synced = 0 AND sync_attempts >= ?1",
                    table.table_name()
                );
                let count: i64 = conn.query_row(&sql, params![max_attempts], |row| row.get(0))?;
                total += usize::try_from(count).unwrap_or(0);
            }
            Ok(total)
        })
        .await
    }

    /// Makes every unsynced row eligible again.
    pub async fn reset_sync_attempts(&self) -> Result<usize> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            let mut total = 0usize;
            for table in SyncTable::ALL {
                let sql = format!(
                    "UPDATE {}
                     SET sync_attempts = 0,
                         next_attempt_at = NULL
                     WHERE synced = 0",
                    table.table_name()
                );
                total += tx.execute(&sql, [])?;
            }
            tx.commit()?;
            Ok(total)
        })
        .await
    }
}
