use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

pub const CONFIG_ENV_VAR: &str = "HEALTHSYNC_CONFIG";
pub const DEBUG_ENV_VAR: &str = "HEALTHSYNC_DEBUG";
const DEFAULT_CONFIG_FILE: &str = "healthsync.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectivitySettings {
    /// Same-origin resource hit by the active probe.
    pub probe_url: String,
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            probe_url: "http://127.0.0.1:8080/favicon.ico".into(),
            probe_interval_secs: 5,
            probe_timeout_secs: 3,
        }
    }
}

impl ConnectivitySettings {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    pub db_path: PathBuf,
    /// Synced vitals kept per patient; unsynced readings are never evicted.
    pub vitals_per_patient: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("healthsync.sqlite3"),
            vitals_per_patient: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 2_000,
            backoff_max_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteSettings {
    /// Base URL of the document store. `None` keeps everything in-process.
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            request_timeout_secs: 10,
        }
    }
}

impl RemoteSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub connectivity: ConnectivitySettings,
    pub cache: CacheSettings,
    pub sync: SyncSettings,
    pub remote: RemoteSettings,
    pub notifications: NotificationSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AppSettings>,
}

impl SettingsStore {
    /// Resolves the settings path from `HEALTHSYNC_CONFIG`, falling back to
    /// `healthsync.json` in the working directory.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::new(path)
    }

    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data: AppSettings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?
        } else {
            AppSettings::default()
        };

        let debug_mode = std::env::var(DEBUG_ENV_VAR)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            data.connectivity.probe_interval_secs = 1;
        }

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn snapshot(&self) -> AppSettings {
        self.read().clone()
    }

    pub fn connectivity(&self) -> ConnectivitySettings {
        self.read().connectivity.clone()
    }

    pub fn cache(&self) -> CacheSettings {
        self.read().cache.clone()
    }

    pub fn sync(&self) -> SyncSettings {
        self.read().sync.clone()
    }

    pub fn remote(&self) -> RemoteSettings {
        self.read().remote.clone()
    }

    pub fn notifications(&self) -> NotificationSettings {
        self.read().notifications.clone()
    }

    pub fn update_notifications(&self, settings: NotificationSettings) -> Result<()> {
        let mut guard = self.write();
        guard.notifications = settings;
        self.persist(&guard)
    }

    fn read(&self) -> RwLockReadGuard<'_, AppSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, data: &AppSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path() -> PathBuf {
        std::env::temp_dir().join(format!("healthsync-settings-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let store = SettingsStore::new(temp_settings_path()).unwrap();
        let settings = store.snapshot();
        assert_eq!(settings.cache.vitals_per_patient, 10);
        assert_eq!(settings.sync.max_attempts, 5);
        assert_eq!(settings.remote.base_url, None);
    }

    #[test]
    fn partial_file_fills_remaining_sections() {
        let path = temp_settings_path();
        fs::write(
            &path,
            r#"{ "connectivity": { "probeTimeoutSecs": 2 }, "sync": { "maxAttempts": 3 } }"#,
        )
        .unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.connectivity().probe_timeout(), Duration::from_secs(2));
        assert_eq!(store.sync().max_attempts, 3);
        assert_eq!(store.sync().backoff_base_ms, 2_000);
        assert!(store.notifications().enabled);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn updates_are_persisted() {
        let path = temp_settings_path();
        let store = SettingsStore::new(path.clone()).unwrap();
        store
            .update_notifications(NotificationSettings { enabled: false })
            .unwrap();

        let reloaded = SettingsStore::new(path.clone()).unwrap();
        assert!(!reloaded.notifications().enabled);

        let _ = fs::remove_file(path);
    }
}
