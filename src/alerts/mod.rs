pub mod acknowledgment;
pub mod evaluator;
pub mod notifier;
pub mod recipients;

pub use acknowledgment::{unacknowledged_count, AckError, AckOutcome, AckTracker, AlertInbox, InboxEntry};
pub use evaluator::{classify, AlertEvaluator};
pub use notifier::{LogNotifier, NotificationSink, SilentNotifier};
pub use recipients::PatientDirectory;
