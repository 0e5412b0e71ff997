pub mod engine;
pub mod state;

pub use engine::{backoff_delay, SyncEngine, SyncOutcome, SyncReport};
pub use state::{transition, SyncEvent, SyncStatus, TransitionError};
