use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use anyhow::{bail, Context, Result};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::settings::ConnectivitySettings;

use super::probe::Probe;

// The probe fires every few seconds; keep this module quiet by default.
const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_info};

pub type SubscriptionId = u64;

type Callback = Arc<dyn Fn(bool) + Send + Sync>;

/// Online/offline events reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeSignal {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Native,
    Probe,
}

struct Shared {
    /// Held across a whole report so subscribers see transitions in the
    /// order the state changed. Callbacks must not report back into the
    /// monitor.
    dispatch: Mutex<()>,
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
    online_tx: watch::Sender<bool>,
}

impl Shared {
    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Callback)>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Subscribers hear every transition. A native "online" event is always
    /// forwarded, even when already online, so it can trigger another sync.
    fn report(&self, online: bool, source: Source) {
        let _dispatch = lock(&self.dispatch);
        let changed = self.online_tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            log_info!(
                "connectivity {} ({:?})",
                if online { "online" } else { "offline" },
                source
            );
        }
        if !changed && !(online && source == Source::Native) {
            return;
        }

        let callbacks: Vec<Callback> = self
            .lock_subscribers()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(online);
        }
    }
}

/// Single "is the network reachable" signal built from native events plus a
/// periodic active probe.
pub struct ConnectivityMonitor {
    shared: Arc<Shared>,
    probe: Arc<dyn Probe>,
    probe_interval: Duration,
    probe_timeout: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
    cancel_token: Mutex<Option<CancellationToken>>,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn Probe>, probe_interval: Duration, probe_timeout: Duration) -> Self {
        let (online_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                dispatch: Mutex::new(()),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                online_tx,
            }),
            probe,
            probe_interval,
            probe_timeout,
            handle: Mutex::new(None),
            cancel_token: Mutex::new(None),
        }
    }

    pub fn from_settings(probe: Arc<dyn Probe>, settings: &ConnectivitySettings) -> Self {
        Self::new(probe, settings.probe_interval(), settings.probe_timeout())
    }

    /// Subscribes `callback` and starts the probe loop on the current runtime.
    pub fn start<F>(&self, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut handle = lock(&self.handle);
        if handle.is_some() {
            bail!("connectivity monitor already running");
        }

        let id = self.subscribe(callback);
        let cancel_token = CancellationToken::new();
        *handle = Some(tokio::spawn(probe_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.probe),
            self.probe_interval,
            self.probe_timeout,
            cancel_token.clone(),
        )));
        *lock(&self.cancel_token) = Some(cancel_token);
        Ok(id)
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .lock_subscribers()
            .push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.shared.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub fn native_signal(&self, signal: NativeSignal) {
        self.shared
            .report(signal == NativeSignal::Online, Source::Native);
    }

    pub fn is_online(&self) -> bool {
        *self.shared.online_tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.shared.online_tx.subscribe()
    }

    pub async fn stop(&self) -> Result<()> {
        if let Some(token) = lock(&self.cancel_token).take() {
            token.cancel();
        }

        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            handle
                .await
                .context("connectivity probe task failed to join")
        } else {
            Ok(())
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn probe_loop(
    shared: Arc<Shared>,
    probe: Arc<dyn Probe>,
    probe_interval: Duration,
    probe_timeout: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(probe_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reachable = match tokio::time::timeout(probe_timeout, probe.check()).await {
                    Ok(Ok(())) => true,
                    Ok(Err(err)) => {
                        log_debug!("connectivity probe failed: {err:#}");
                        false
                    }
                    Err(_) => {
                        log_debug!("connectivity probe timed out after {probe_timeout:?}");
                        false
                    }
                };
                shared.report(reachable, Source::Probe);
            }
            _ = cancel_token.cancelled() => {
                log_info!("connectivity monitor shutting down");
                break;
            }
        }
    }
}
