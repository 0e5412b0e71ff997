use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Synchronization status shown to the user.
///
/// ```text
/// Offline --PassStarted--> Syncing --PassSucceeded--> Synced --Settled--> Online
///                             |
///                             +--PassFailed--> SyncError --ConnectivityRestored--> Online
/// any --ConnectivityLost--> Offline
/// ```
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Offline,
    Syncing,
    Synced,
    SyncError,
    Online,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Offline => "offline",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::SyncError => "sync-error",
            SyncStatus::Online => "online",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    ConnectivityLost,
    ConnectivityRestored,
    PassStarted,
    PassSucceeded,
    PassFailed,
    /// A successful pass finished while still online.
    Settled,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("illegal sync transition: {event:?} while {from}")]
pub struct TransitionError {
    pub from: SyncStatus,
    pub event: SyncEvent,
}

/// Next status for `event`. Re-applying the event that produced the current
/// status is a no-op; anything else not drawn above is rejected.
pub fn transition(from: SyncStatus, event: SyncEvent) -> Result<SyncStatus, TransitionError> {
    use SyncEvent::*;
    use SyncStatus::*;

    let next = match (from, event) {
        (_, ConnectivityLost) => Offline,

        (Offline | SyncError, ConnectivityRestored) => Online,
        (Online | Syncing | Synced, ConnectivityRestored) => from,

        (Offline | Online | Synced | SyncError, PassStarted) => Syncing,
        (Syncing, PassSucceeded) => Synced,
        (Syncing, PassFailed) => SyncError,
        (Synced, Settled) => Online,

        _ => return Err(TransitionError { from, event }),
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_runs_offline_to_online() {
        let mut status = SyncStatus::Offline;
        let mut seen = vec![status];
        for event in [SyncEvent::PassStarted, SyncEvent::PassSucceeded, SyncEvent::Settled] {
            status = transition(status, event).unwrap();
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![
                SyncStatus::Offline,
                SyncStatus::Syncing,
                SyncStatus::Synced,
                SyncStatus::Online
            ]
        );
    }

    #[test]
    fn failure_recovers_through_connectivity() {
        let status = transition(SyncStatus::Syncing, SyncEvent::PassFailed).unwrap();
        assert_eq!(status, SyncStatus::SyncError);
        assert_eq!(
            transition(status, SyncEvent::ConnectivityRestored).unwrap(),
            SyncStatus::Online
        );
        assert_eq!(
            transition(status, SyncEvent::ConnectivityLost).unwrap(),
            SyncStatus::Offline
        );
    }

    #[test]
    fn overlapping_pass_is_illegal() {
        let err = transition(SyncStatus::Syncing, SyncEvent::PassStarted).unwrap_err();
        assert_eq!(err.from, SyncStatus::Syncing);
        assert!(transition(SyncStatus::Offline, SyncEvent::PassSucceeded).is_err());
        assert!(transition(SyncStatus::Online, SyncEvent::Settled).is_err());
    }

    #[test]
    fn status_serializes_as_kebab_case() {
        assert_eq!(
            serde_json::to_string(&SyncStatus::SyncError).unwrap(),
            "\"sync-error\""
        );
    }
}
