pub mod config;
pub mod defaults;
pub mod registry;

pub use config::{ThresholdConfig, ThresholdError, ThresholdRange, ThresholdRangeInput};
pub use defaults::{default_config, default_range};
pub use registry::{ThresholdRegistry, ThresholdSource};
