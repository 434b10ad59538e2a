//! Notification backend implementations

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{
    DesktopConfig, Notification, NotificationBackend, NotificationError, NotificationResult,
    NotifierConfig, WebhookConfig,
};

/// Backend that records notifications in the supervisor log.
///
/// Always enabled; guarantees every notification leaves a trace even with no
/// external sink configured.
pub struct LogBackend;

#[async_trait]
impl NotificationBackend for LogBackend {
    fn name(&self) -> &'static str {
        "log"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        tracing::info!(
            target: "notify",
            severity = %notification.severity,
            title = %notification.title,
            "{}",
            notification.message
        );
        Ok(())
    }
}

/// Backend shelling out to a desktop notification command
pub struct DesktopBackend {
    config: DesktopConfig,
}

impl DesktopBackend {
    pub fn new(config: DesktopConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl NotificationBackend for DesktopBackend {
    fn name(&self) -> &'static str {
        "desktop"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.command.is_empty()
    }

    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        let status = tokio::process::Command::new(&self.config.command)
            .args(&self.config.args)
            .arg(&notification.title)
            .arg(&notification.message)
            .status()
            .await?;

        if status.success() {
            debug!("desktop notification delivered");
            Ok(())
        } else {
            Err(NotificationError::Command(format!(
                "{} exited with {status}",
                self.config.command
            )))
        }
    }
}

/// Backend posting the notification as JSON to a configured URL
pub struct WebhookBackend {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookBackend {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationBackend for WebhookBackend {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.url.is_empty()
    }

    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        let mut request = self.client.post(&self.config.url);
        if let Some(ref token) = self.config.auth_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let payload = serde_json::json!({
            "id": notification.id,
            "timestamp": notification.timestamp.to_rfc3339(),
            "severity": notification.severity.to_string(),
            "title": notification.title,
            "message": notification.message,
            "hostname": notification.hostname,
        });

        debug!("posting webhook notification to {}", self.config.url);
        let response = request.json(&payload).send().await?;
        response.error_for_status()?;
        Ok(())
    }
}

/// Build the backend list from configuration
pub fn create_backends(config: &NotifierConfig) -> Vec<Arc<dyn NotificationBackend>> {
    let mut backends: Vec<Arc<dyn NotificationBackend>> = vec![Arc::new(LogBackend)];

    if let Some(ref desktop) = config.desktop {
        backends.push(Arc::new(DesktopBackend::new(desktop.clone())));
    }
    if let Some(ref webhook) = config.webhook {
        backends.push(Arc::new(WebhookBackend::new(webhook.clone())));
    }

    backends
}
