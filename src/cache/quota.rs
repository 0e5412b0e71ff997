use std::path::Path;

use sysinfo::Disks;

/// Raw capacity figures for the volume holding the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaEstimate {
    pub total_space: u64,
    pub available_space: u64,
}

/// Platform storage introspection. `None` means the platform cannot tell.
pub trait QuotaProvider: Send + Sync {
    fn estimate(&self, path: &Path) -> Option<QuotaEstimate>;
}

/// Reads the disk that hosts the cache file via `sysinfo`.
#[derive(Debug, Default)]
pub struct DiskQuota;

impl QuotaProvider for DiskQuota {
    fn estimate(&self, path: &Path) -> Option<QuotaEstimate> {
        let resolved = path
            .canonicalize()
            .or_else(|_| std::env::current_dir().map(|dir| dir.join(path)))
            .ok()?;

        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| resolved.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| QuotaEstimate {
                total_space: disk.total_space(),
                available_space: disk.available_space(),
            })
    }
}

/// For environments without quota introspection.
#[derive(Debug, Default)]
pub struct NoQuota;

impl QuotaProvider for NoQuota {
    fn estimate(&self, _path: &Path) -> Option<QuotaEstimate> {
        None
    }
}
