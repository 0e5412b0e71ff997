use std::sync::Arc;

use anyhow::Result;

use crate::{db::Alert, settings::SettingsStore};

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Surfaces a "new alert" notification to the platform. Delivery is best
/// effort: callers log and drop any error.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Default sink: writes the notification to the log when notifications are
/// enabled in settings.
pub struct LogNotifier {
    settings: Arc<SettingsStore>,
}

impl LogNotifier {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings }
    }
}

impl NotificationSink for LogNotifier {
    fn notify(&self, alert: &Alert) -> Result<()> {
        if !self.settings.notifications().enabled {
            return Ok(());
        }
        log_info!(
            "[{}] {}: {}",
            alert.severity.as_str().to_uppercase(),
            alert.patient_name,
            alert.message
        );
        Ok(())
    }
}

/// Sink used when notifications are not wanted at all.
pub struct SilentNotifier;

impl NotificationSink for SilentNotifier {
    fn notify(&self, _alert: &Alert) -> Result<()> {
        Ok(())
    }
}
