pub mod alert;
pub mod contact;
pub mod medication;
pub mod patient;
pub mod storage;
pub mod vital;

pub use alert::{Acknowledgment, Alert, Severity};
pub use contact::{ContactPriority, EmergencyContact};
pub use medication::Medication;
pub use patient::PatientProfile;
pub use storage::{Pending, StorageInfo, UnsyncedData};
pub use vital::{reading_id, VitalReading, VitalType, VitalValue};
