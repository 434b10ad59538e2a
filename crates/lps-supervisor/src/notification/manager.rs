//! Notification fan-out

use std::sync::Arc;

use tracing::{debug, error};

use super::{create_backends, Notification, NotificationBackend, NotifierConfig, Severity};

/// Fans notifications out to every enabled backend.
///
/// Delivery failures are logged per backend and swallowed; `notify` never
/// returns an error to the caller.
pub struct Notifier {
    config: NotifierConfig,
    backends: Vec<Arc<dyn NotificationBackend>>,
}

impl Notifier {
    pub fn new(config: NotifierConfig) -> Self {
        let backends = create_backends(&config);
        let enabled: Vec<&str> = backends
            .iter()
            .filter(|b| b.is_enabled())
            .map(|b| b.name())
            .collect();
        tracing::info!(backends = ?enabled, "notifier initialized");

        Self { config, backends }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Deliver a `(title, message)` pair at the given severity, best-effort
    pub async fn notify(&self, severity: Severity, title: &str, message: &str) {
        if !self.config.enabled {
            debug!("notifications disabled, skipping");
            return;
        }
        if !severity.meets(self.config.min_severity) {
            debug!(%severity, "below minimum severity, skipping");
            return;
        }

        let notification = Notification::new(severity, title, message);
        for backend in &self.backends {
            if !backend.is_enabled() {
                continue;
            }
            if let Err(err) = backend.send(&notification).await {
                error!("notification via {} failed: {err}", backend.name());
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}
