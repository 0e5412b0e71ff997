use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::Serialize;

use crate::{
    db::{Database, VitalType},
    remote::RemoteStore,
};

use super::{defaults::default_config, ThresholdConfig, ThresholdError, ThresholdRange};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Where the in-memory configuration came from.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ThresholdSource {
    BuiltIn,
    Remote,
    LocalSnapshot,
}

struct RegistryState {
    config: ThresholdConfig,
    source: ThresholdSource,
}

/// Single source of truth for alerting bounds. Reads never fail: until a
/// load succeeds the built-in defaults (or the last local snapshot) apply.
pub struct ThresholdRegistry {
    remote: Arc<dyn RemoteStore>,
    db: Database,
    state: RwLock<RegistryState>,
}

impl ThresholdRegistry {
    pub fn new(remote: Arc<dyn RemoteStore>, db: Database) -> Self {
        Self {
            remote,
            db,
            state: RwLock::new(RegistryState {
                config: default_config(),
                source: ThresholdSource::BuiltIn,
            }),
        }
    }

    pub fn current(&self) -> ThresholdConfig {
        self.read().config.clone()
    }

    pub fn source(&self) -> ThresholdSource {
        self.read().source
    }

    pub fn range_for(&self, vital: VitalType) -> Option<ThresholdRange> {
        self.read().config.get(vital).cloned()
    }

    /// Fetches the remote configuration. When none exists the built-in
    /// defaults are written and returned. On failure the last local
    /// snapshot (or the current state) stays in effect and the error is
    /// returned for display.
    pub async fn load(&self) -> Result<ThresholdConfig, ThresholdError> {
        match self.remote.load_thresholds().await {
            Ok(Some(config)) => {
                config.validate()?;
                self.install(config.clone(), ThresholdSource::Remote).await;
                Ok(config)
            }
            Ok(None) => {
                let defaults = default_config();
                log_info!("no threshold configuration found, writing defaults");
                if let Err(err) = self.remote.save_thresholds(&defaults).await {
                    log_warn!("failed to write default thresholds: {err}");
                    self.set(defaults, ThresholdSource::BuiltIn);
                    return Err(err.into());
                }
                self.install(defaults.clone(), ThresholdSource::Remote).await;
                Ok(defaults)
            }
            Err(err) => {
                log_warn!("failed to load thresholds: {err}");
                self.fall_back_to_snapshot().await;
                Err(err.into())
            }
        }
    }

    /// Validates, stamps and persists a full configuration.
    pub async fn save(&self, mut config: ThresholdConfig) -> Result<ThresholdConfig, ThresholdError> {
        config.validate()?;
        config.updated_at = Utc::now();
        self.remote.save_thresholds(&config).await?;
        self.install(config.clone(), ThresholdSource::Remote).await;
        log_info!("threshold configuration saved at {}", config.updated_at);
        Ok(config)
    }

    /// Validates and persists one vital's range on top of the current config.
    pub async fn save_range(
        &self,
        vital: VitalType,
        range: ThresholdRange,
    ) -> Result<ThresholdConfig, ThresholdError> {
        range.validate(vital)?;
        let mut config = self.current();
        config.set(vital, range);
        self.save(config).await
    }

    /// Restores the built-in defaults in memory only; call `save` to persist.
    pub fn reset_to_defaults(&self) -> ThresholdConfig {
        let defaults = default_config();
        self.set(defaults.clone(), ThresholdSource::BuiltIn);
        defaults
    }

    async fn install(&self, config: ThresholdConfig, source: ThresholdSource) {
        if let Err(err) = self.db.save_threshold_snapshot(&config).await {
            log_warn!("failed to cache threshold snapshot: {err:#}");
        }
        self.set(config, source);
    }

    async fn fall_back_to_snapshot(&self) {
        if self.source() != ThresholdSource::BuiltIn {
            return;
        }
        match self.db.load_threshold_snapshot().await {
            Ok(Some(snapshot)) if snapshot.validate().is_ok() => {
                log_info!("using cached threshold snapshot from {}", snapshot.updated_at);
                self.set(snapshot, ThresholdSource::LocalSnapshot);
            }
            Ok(_) => {}
            Err(err) => log_warn!("failed to read threshold snapshot: {err:#}"),
        }
    }

    fn set(&self, config: ThresholdConfig, source: ThresholdSource) {
        let mut state = self.write();
        state.config = config;
        state.source = source;
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::test_support::temp_database,
        remote::{MemoryRemoteStore, CONFIG_COLLECTION, THRESHOLDS_DOCUMENT},
        thresholds::defaults::default_range,
    };

    #[tokio::test]
    async fn load_writes_defaults_when_absent() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let registry = ThresholdRegistry::new(remote.clone(), temp_database());

        let loaded = registry.load().await.unwrap();
        assert_eq!(remote.thresholds(), Some(loaded.clone()));
        assert_eq!(remote.write_count(CONFIG_COLLECTION, THRESHOLDS_DOCUMENT), 1);
        assert_eq!(registry.source(), ThresholdSource::Remote);

        // A second load reads the stored document instead of rewriting it.
        registry.load().await.unwrap();
        assert_eq!(remote.write_count(CONFIG_COLLECTION, THRESHOLDS_DOCUMENT), 1);
    }

    #[tokio::test]
    async fn save_stamps_and_persists() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let registry = ThresholdRegistry::new(remote.clone(), temp_database());
        let before = registry.current().updated_at;

        let mut range = default_range(VitalType::HeartRate);
        range.max_value = 95.0;
        let saved = registry.save_range(VitalType::HeartRate, range).await.unwrap();

        assert!(saved.updated_at >= before);
        assert_eq!(registry.range_for(VitalType::HeartRate).unwrap().max_value, 95.0);
        assert_eq!(remote.thresholds().unwrap().get(VitalType::HeartRate).unwrap().max_value, 95.0);
    }

    #[tokio::test]
    async fn invalid_save_leaves_state_untouched() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let registry = ThresholdRegistry::new(remote.clone(), temp_database());

        let mut range = default_range(VitalType::HeartRate);
        range.warning_max = 90.0;
        assert!(registry.save_range(VitalType::HeartRate, range).await.is_err());
        assert_eq!(registry.range_for(VitalType::HeartRate), Some(default_range(VitalType::HeartRate)));
        assert!(remote.thresholds().is_none());
    }

    #[tokio::test]
    async fn reset_is_local_until_saved() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let registry = ThresholdRegistry::new(remote.clone(), temp_database());

        let mut range = default_range(VitalType::Temperature);
        range.max_value = 37.5;
        registry.save_range(VitalType::Temperature, range).await.unwrap();

        registry.reset_to_defaults();
        assert_eq!(registry.range_for(VitalType::Temperature).unwrap().max_value, 37.2);
        assert_eq!(
            remote.thresholds().unwrap().get(VitalType::Temperature).unwrap().max_value,
            37.5
        );
    }
}
