use anyhow::Context;
use async_trait::async_trait;

use super::{Notification, NotificationDispatcher};

/// Posts each notification as JSON to an external delivery service.
pub struct WebhookDispatcher {
    url: String,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn dispatch(&self, notification: &Notification) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .context("failed to reach notification endpoint")?
            .error_for_status()
            .context("notification endpoint returned error")?;

        Ok(())
    }
}
