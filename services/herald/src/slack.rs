//! Slack incoming-webhook notifier

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::HeraldError;
use crate::io::HttpClient;
use crate::notifier::{FieldType, FormField, NotificationConfig, Notifier};

/// Posts rendered messages to a Slack incoming webhook
pub struct SlackNotifier {
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackNotifier").finish_non_exhaustive()
    }
}

impl SlackNotifier {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    ["https://", "http://"]
        .iter()
        .any(|scheme| lower.len() > scheme.len() && lower.starts_with(scheme))
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn select(&self) -> NotificationConfig {
        NotificationConfig {
            method: "slack".to_string(),
            title: "Slack".to_string(),
            description: "Send a message to a Slack channel through an incoming webhook."
                .to_string(),
            author: String::new(),
            author_url: String::new(),
            icon: "fab fa-slack".to_string(),
            delay: Duration::from_secs(10),
            limits: 30,
            success_template: "Your service '{{name}}' is currently online!".to_string(),
            failure_template: "Your service '{{name}}' is currently offline! {{issue}}".to_string(),
            form: vec![
                FormField {
                    field_type: FieldType::Text,
                    title: "Incoming Webhook URL".to_string(),
                    placeholder: "https://hooks.slack.com/services/...".to_string(),
                    config_key: "webhook_url".to_string(),
                    required: true,
                    options: None,
                },
                FormField {
                    field_type: FieldType::Text,
                    title: "Channel".to_string(),
                    placeholder: "Override the webhook's default channel, e.g. #alerts".to_string(),
                    config_key: "channel".to_string(),
                    required: false,
                    options: None,
                },
            ],
            values: BTreeMap::new(),
            enabled: false,
        }
    }

    async fn send(&self, config: &NotificationConfig, message: &str) -> crate::Result<String> {
        let webhook_url = config.require("webhook_url")?;
        let mut payload = json!({ "text": message });
        if let Some(channel) = config.value("channel") {
            payload["channel"] = json!(channel);
        }

        let response = self.http.post_json(webhook_url, &payload).await?;
        if !response.is_success() {
            return Err(HeraldError::SendFailure(format!(
                "Slack webhook returned status {}: {}",
                response.status, response.body
            )));
        }

        tracing::debug!("Slack message delivered");
        Ok(response.body)
    }

    async fn on_save(&self, config: &NotificationConfig) -> crate::Result<String> {
        config.validate()?;
        let webhook_url = config.require("webhook_url")?;
        if !is_http_url(webhook_url) {
            return Err(HeraldError::Validation(format!(
                "Slack webhook URL must be http(s), got '{}'",
                webhook_url
            )));
        }
        Ok("Slack settings saved".to_string())
    }
}
