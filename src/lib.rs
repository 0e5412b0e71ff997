pub mod alerts;
pub mod cache;
pub mod connectivity;
pub mod db;
pub mod ingest;
pub mod remote;
pub mod settings;
pub mod sync;
pub mod thresholds;
pub mod utils;

use std::{collections::HashSet, sync::Arc};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use alerts::{AckTracker, AlertEvaluator, LogNotifier, NotificationSink, PatientDirectory};
use cache::{CacheStore, CacheWrite, DiskQuota, QuotaProvider};
use connectivity::{ConnectivityMonitor, HttpProbe, Probe};
use db::Database;
use ingest::Ingestor;
use remote::{HttpRemoteStore, MemoryRemoteStore, RemoteError, RemoteStore, TimeoutRemote};
use settings::{RemoteSettings, SettingsStore};
use sync::SyncEngine;
use thresholds::ThresholdRegistry;

const ENABLE_LOGS: bool = true;

/// Every service of the running process, constructed once and shared.
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub db: Database,
    pub cache: CacheStore,
    pub remote: Arc<dyn RemoteStore>,
    pub thresholds: Arc<ThresholdRegistry>,
    pub patients: Arc<PatientDirectory>,
    pub evaluator: Arc<AlertEvaluator>,
    pub acknowledgments: AckTracker,
    pub sync: SyncEngine,
    pub monitor: ConnectivityMonitor,
}

impl AppState {
    pub fn from_settings(settings: Arc<SettingsStore>) -> Result<Self> {
        let connectivity = settings.connectivity();
        let probe = Arc::new(HttpProbe::new(
            connectivity.probe_url.clone(),
            connectivity.probe_timeout(),
        )?);
        let remote = build_remote(&settings.remote())?;
        let notifier = Arc::new(LogNotifier::new(Arc::clone(&settings)));
        Self::assemble(settings, remote, Arc::new(DiskQuota), probe, notifier)
    }

    /// Wires the services around explicit collaborators.
    pub fn assemble(
        settings: Arc<SettingsStore>,
        remote: Arc<dyn RemoteStore>,
        quota: Arc<dyn QuotaProvider>,
        probe: Arc<dyn Probe>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let cache_settings = settings.cache();
        let db = Database::new(cache_settings.db_path.clone())?;
        let cache = CacheStore::new(db.clone(), quota, cache_settings.vitals_per_patient);
        let thresholds = Arc::new(ThresholdRegistry::new(Arc::clone(&remote), db.clone()));
        let patients = Arc::new(PatientDirectory::new(Arc::clone(&remote), db.clone()));
        let evaluator = Arc::new(AlertEvaluator::with_directory(
            Arc::clone(&thresholds),
            cache.clone(),
            Arc::clone(&remote),
            notifier,
            Arc::clone(&patients),
        ));
        let acknowledgments = AckTracker::new(Arc::clone(&remote), db.clone());
        let sync = SyncEngine::with_directory(
            db.clone(),
            Arc::clone(&remote),
            settings.sync(),
            Arc::clone(&patients),
        );
        let monitor = ConnectivityMonitor::from_settings(probe, &settings.connectivity());

        Ok(Self {
            settings,
            db,
            cache,
            remote,
            thresholds,
            patients,
            evaluator,
            acknowledgments,
            sync,
            monitor,
        })
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.cache.clone(), Arc::clone(&self.evaluator)).with_sync(self.sync.clone())
    }

    /// Caches the remote copy of a patient's profile, contacts and
    /// medications.
    pub async fn refresh_patient(&self, patient_id: &str) -> Result<CacheWrite, RemoteError> {
        self.patients.refresh(patient_id).await?;
        let contacts = self.remote.fetch_contacts(patient_id).await?;
        let medications = self.remote.fetch_medications(patient_id).await?;
        Ok(self
            .cache
            .cache_patient_snapshot(patient_id, &contacts, &medications)
            .await)
    }

    /// Subscribes the sync engine to connectivity changes and starts probing.
    pub fn start_monitor(&self) -> Result<()> {
        let engine = self.sync.clone();
        let runtime = tokio::runtime::Handle::current();
        self.monitor.start(move |online| {
            engine.set_online(online);
            if online {
                let engine = engine.clone();
                runtime.spawn(async move {
                    let report = engine.sync_data().await;
                    log_info!(
                        "sync after reconnect: {:?} (pushed {}, failed {}, parked {})",
                        report.outcome, report.pushed, report.failed, report.parked
                    );
                });
            }
        })?;
        Ok(())
    }
}

/// HTTP document store when a base URL is configured, otherwise an
/// in-process store. Either way every call is bounded by the request timeout.
pub fn build_remote(settings: &RemoteSettings) -> Result<Arc<dyn RemoteStore>> {
    let timeout = settings.request_timeout();
    let inner: Arc<dyn RemoteStore> = match &settings.base_url {
        Some(base_url) => Arc::new(HttpRemoteStore::new(
            base_url,
            settings.api_token.clone(),
            timeout,
        )?),
        None => {
            log_warn!("No remote store configured; records stay in this process");
            Arc::new(MemoryRemoteStore::new())
        }
    };
    Ok(Arc::new(TimeoutRemote::new(inner, timeout)))
}

pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log_info!("healthsync starting up...");

    let settings = Arc::new(SettingsStore::from_env()?);
    let state = Arc::new(AppState::from_settings(settings)?);

    if let Err(err) = state.thresholds.load().await {
        log_warn!(
            "Threshold load failed, using {:?} thresholds: {err}",
            state.thresholds.source()
        );
    }

    let storage = state.cache.get_storage_info().await;
    match storage.degraded {
        Some(reason) => log_warn!("Storage info unavailable: {reason}"),
        None => log_info!(
            "Cache storage: {} of {} bytes used ({:.1}%)",
            storage.value.usage, storage.value.quota, storage.value.percentage_used
        ),
    }

    state.start_monitor()?;

    let ingestor = state.ingestor();
    let mut refreshed = HashSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    log_info!("Feed closed");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match ingestor.ingest_line(line).await {
                    Ok(outcome) => {
                        let patient_id = outcome.reading.patient_id;
                        if state.sync.is_online() && refreshed.insert(patient_id.clone()) {
                            let state = Arc::clone(&state);
                            tokio::spawn(async move {
                                if let Err(err) = state.refresh_patient(&patient_id).await {
                                    log_warn!("Failed to refresh patient {patient_id}: {err}");
                                }
                            });
                        }
                    }
                    Err(err) => log_warn!("Dropping feed event: {err}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log_info!("Interrupted");
                break;
            }
        }
    }

    state.monitor.stop().await?;
    let final_pass = state.sync.sync_data().await;
    log_info!("Final sync: {:?}", final_pass.outcome);
    Ok(())
}
