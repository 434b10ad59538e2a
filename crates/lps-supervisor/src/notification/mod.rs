//! Notification sink
//!
//! Monitors report noteworthy findings as `(title, message)` pairs; this
//! module fans them out to the configured backends. Delivery is strictly
//! best-effort: a failing backend is logged and never propagates into the
//! supervisor.

mod backends;
mod manager;

pub use backends::*;
pub use manager::*;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Notification severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, low priority
    Info,
    /// Something worth the proctor's attention
    Warning,
    /// A detected violation
    #[default]
    Alert,
}

impl Severity {
    fn level(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Alert => 2,
        }
    }

    /// True when this severity clears the given minimum
    pub fn meets(self, min: Severity) -> bool {
        self.level() >= min.level()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Alert => write!(f, "alert"),
        }
    }
}

/// One notification payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub hostname: String,
}

impl Notification {
    pub fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            title: title.into(),
            message: message.into(),
            hostname: gethostname(),
        }
    }
}

fn gethostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Notification backend errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notifier command failed: {0}")]
    Command(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for notification delivery
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Trait implemented by every notification backend
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Whether the backend is configured and enabled
    fn is_enabled(&self) -> bool;

    /// Deliver one notification
    async fn send(&self, notification: &Notification) -> NotificationResult<()>;
}

/// Notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Global enable/disable
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum severity that triggers delivery
    #[serde(default)]
    pub min_severity: Severity,

    /// Desktop notification command
    #[serde(default)]
    pub desktop: Option<DesktopConfig>,

    /// Generic webhook
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_severity: Severity::default(),
            desktop: None,
            webhook: None,
        }
    }
}

/// Desktop notification command settings (`notify-send` style: the title and
/// message are appended as the final two arguments)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesktopConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_desktop_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_desktop_command(),
            args: Vec::new(),
        }
    }
}

/// Generic webhook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub url: String,

    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_desktop_command() -> String {
    "notify-send".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Alert.meets(Severity::Info));
        assert!(Severity::Warning.meets(Severity::Warning));
        assert!(!Severity::Info.meets(Severity::Alert));
    }

    #[test]
    fn notification_carries_payload() {
        let n = Notification::new(Severity::Warning, "Gaze", "Looked away for 1 minute");
        assert_eq!(n.severity, Severity::Warning);
        assert_eq!(n.title, "Gaze");
        assert_eq!(n.message, "Looked away for 1 minute");
        assert!(!n.hostname.is_empty());
    }

    #[test]
    fn notifier_config_parses_from_toml() {
        let config: NotifierConfig = toml::from_str(
            r#"
enabled = true
min_severity = "warning"

[desktop]
command = "notify-send"

[webhook]
url = "https://example.invalid/hook"
"#,
        )
        .unwrap();

        assert_eq!(config.min_severity, Severity::Warning);
        assert!(config.desktop.is_some());
        assert_eq!(config.webhook.unwrap().url, "https://example.invalid/hook");
    }
}
