pub mod monitor;
pub mod probe;

pub use monitor::{ConnectivityMonitor, NativeSignal, SubscriptionId};
pub use probe::{HttpProbe, Probe};
