//! Webhook transport posting milestone payloads as JSON.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use leaveflow_core::config::NotificationEndpoints;

use crate::{Channel, NotificationGateway, NotificationMessage, NotifyError};

pub struct WebhookNotifier {
    client: Client,
    endpoints: NotificationEndpoints,
}

/// The wire shape endpoints receive. The milestone tag uses the storage
/// encoding, not the enum variant name.
fn payload(message: &NotificationMessage) -> serde_json::Value {
    serde_json::json!({
        "dedupe_key": message.dedupe_key,
        "milestone": message.milestone.as_str(),
        "recipients": message.recipients,
        "subject": message.subject,
        "body": message.body,
    })
}

impl WebhookNotifier {
    pub fn new(endpoints: NotificationEndpoints) -> Self {
        Self { client: Client::new(), endpoints }
    }

    fn endpoint(&self, channel: Channel) -> Option<&SecretString> {
        match channel {
            Channel::Email => self.endpoints.email_webhook_url.as_ref(),
            Channel::Slack => self.endpoints.slack_webhook_url.as_ref(),
            Channel::Teams => self.endpoints.teams_webhook_url.as_ref(),
        }
    }
}

#[async_trait]
impl NotificationGateway for WebhookNotifier {
    async fn send(
        &self,
        channel: Channel,
        message: &NotificationMessage,
    ) -> Result<(), NotifyError> {
        let endpoint = self.endpoint(channel).ok_or(NotifyError::NotConfigured { channel })?;

        let response = self
            .client
            .post(endpoint.expose_secret())
            .json(&payload(message))
            .send()
            .await
            .map_err(|e| NotifyError::Delivery { channel, reason: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Delivery {
                channel,
                reason: format!("endpoint returned {status}"),
            });
        }

        debug!(channel = %channel, dedupe_key = %message.dedupe_key, "notification delivered");
        Ok(())
    }
}
