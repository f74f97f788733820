//! Staff notifications (Discord webhook, or the log when none is set).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

use crate::{Result, ServiceError};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}

/// Writes notifications to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        info!(message = %message, "notification");
        Ok(())
    }
}

pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, webhook_url: webhook_url.into() })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        // Discord rejects content over 2000 characters.
        let content: String = message.chars().take(2000).collect();
        let response = self.client.post(&self.webhook_url).json(&json!({ "content": content })).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "discord webhook rejected notification");
        Err(ServiceError::UpstreamFailure(format!("discord returned {status}")))
    }
}
