pub mod quota;
pub mod store;

pub use quota::{DiskQuota, NoQuota, QuotaEstimate, QuotaProvider};
pub use store::{CacheRead, CacheStore, CacheWrite};
