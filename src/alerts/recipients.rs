use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    db::{Database, PatientProfile},
    remote::{RemoteResult, RemoteStore},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Resolves who an alert is for. Remote profiles are memoized and written
/// through to the cache, which answers when the remote store cannot.
pub struct PatientDirectory {
    remote: Arc<dyn RemoteStore>,
    db: Database,
    profiles: Mutex<HashMap<String, PatientProfile>>,
}

impl PatientDirectory {
    pub fn new(remote: Arc<dyn RemoteStore>, db: Database) -> Self {
        Self {
            remote,
            db,
            profiles: Mutex::new(HashMap::new()),
        }
    }

    /// Memo, then remote, then the cached profile.
    pub async fn lookup(&self, patient_id: &str) -> Option<PatientProfile> {
        if let Some(profile) = self.lock_profiles().get(patient_id) {
            return Some(profile.clone());
        }
        match self.refresh(patient_id).await {
            Ok(profile) => profile,
            Err(err) => {
                log_debug!("patient {patient_id} lookup failed, using cached profile: {err}");
                self.cached(patient_id).await
            }
        }
    }

    /// Fetches the remote profile and stores it for offline use.
    pub async fn refresh(&self, patient_id: &str) -> RemoteResult<Option<PatientProfile>> {
        let Some(profile) = self.remote.fetch_patient(patient_id).await? else {
            return Ok(None);
        };
        if let Err(err) = self.db.upsert_patient(&profile).await {
            log_warn!("failed to cache patient {patient_id}: {err:#}");
        }
        self.lock_profiles()
            .insert(patient_id.to_string(), profile.clone());
        Ok(Some(profile))
    }

    async fn cached(&self, patient_id: &str) -> Option<PatientProfile> {
        match self.db.get_patient(patient_id).await {
            Ok(profile) => profile,
            Err(err) => {
                log_warn!("failed to read cached patient {patient_id}: {err:#}");
                None
            }
        }
    }

    fn lock_profiles(&self) -> MutexGuard<'_, HashMap<String, PatientProfile>> {
        match self.profiles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
