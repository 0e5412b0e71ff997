use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::{
    db::{connection::Database, helpers::format_datetime},
    thresholds::ThresholdConfig,
};

impl Database {
    /// Keeps the last configuration seen so alerts can be evaluated offline.
    pub async fn save_threshold_snapshot(&self, config: &ThresholdConfig) -> Result<()> {
        let config = config.clone();
        self.execute(move |conn| {
            let payload =
                serde_json::to_string(&config).context("failed to encode threshold config")?;
            conn.execute(
                "INSERT INTO threshold_snapshot (id, payload_json, updated_at)
                 VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                     payload_json = excluded.payload_json,
                     updated_at = excluded.updated_at",
                params![payload, format_datetime(&config.updated_at)],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn load_threshold_snapshot(&self) -> Result<Option<ThresholdConfig>> {
        self.execute(|conn| {
            let payload: Option<String> = conn
                .query_row(
                    "SELECT payload_json FROM threshold_snapshot WHERE id = 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            payload
                .map(|raw| serde_json::from_str(&raw).context("failed to decode threshold snapshot"))
                .transpose()
        })
        .await
    }
}
