pub mod alerts;
pub mod contacts;
pub mod medications;
pub mod patients;
pub mod sync_state;
pub mod thresholds;
pub mod vitals;

pub use sync_state::SyncTable;
