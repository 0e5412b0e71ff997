//! On-device SQLite cache: connection worker, schema migrations, models and
//! per-table repositories (implemented as `impl Database` blocks).

pub mod connection;
pub mod helpers;
mod migrations;
pub mod models;
pub mod repositories;

pub use connection::Database;
pub use models::{
    Acknowledgment, Alert, ContactPriority, EmergencyContact, Medication, PatientProfile,
    Pending, Severity, StorageInfo, UnsyncedData, VitalReading, VitalType, VitalValue,
};
pub use repositories::SyncTable;

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use super::Database;

    pub fn temp_db_path() -> PathBuf {
        std::env::temp_dir()
            .join("healthsync-tests")
            .join(format!("{}.sqlite3", uuid::Uuid::new_v4()))
    }

    pub fn temp_database() -> Database {
        Database::new(temp_db_path()).expect("open temp database")
    }
}
