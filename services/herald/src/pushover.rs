//! Pushover notification client

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::HeraldError;
use crate::io::HttpClient;
use crate::notifier::{FieldType, FormField, NotificationConfig, Notifier};

const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";
const PUSHOVER_VALIDATE_URL: &str = "https://api.pushover.net/1/users/validate.json";

/// Emergency messages repeat every `retry` seconds until acknowledged or
/// `expire` seconds have passed.
const EMERGENCY_RETRY_SECS: &str = "60";
const EMERGENCY_EXPIRE_SECS: &str = "3600";

const PRIORITIES: [(&str, i8); 5] = [
    ("Lowest", -2),
    ("Low", -1),
    ("Normal", 0),
    ("High", 1),
    ("Emergency", 2),
];

const SOUNDS: [&str; 22] = [
    "none",
    "pushover",
    "bike",
    "bugle",
    "cashregister",
    "classical",
    "cosmic",
    "falling",
    "gamelan",
    "incoming",
    "intermission",
    "magic",
    "mechanical",
    "pianobar",
    "siren",
    "spacealarm",
    "tugboat",
    "alien",
    "climb",
    "persistent",
    "echo",
    "updown",
];

/// Map a priority list entry (or its numeric value) to the API's -2..=2
fn parse_priority(value: &str) -> Option<i8> {
    let value = value.trim();
    PRIORITIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value))
        .map(|(_, level)| *level)
        .or_else(|| value.parse::<i8>().ok().filter(|p| (-2..=2).contains(p)))
}

/// Pushover notification sender
pub struct PushoverNotifier {
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for PushoverNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushoverNotifier").finish_non_exhaustive()
    }
}

impl PushoverNotifier {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    fn priority(config: &NotificationConfig) -> i8 {
        match config.value("priority") {
            None => 0,
            Some(value) => parse_priority(value).unwrap_or_else(|| {
                tracing::warn!("Unknown Pushover priority '{}', using Normal", value);
                0
            }),
        }
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    fn select(&self) -> NotificationConfig {
        NotificationConfig {
            method: "pushover".to_string(),
            title: "Pushover".to_string(),
            description: "Use Pushover to receive push notifications. You will need to create \
                          a New Application on Pushover before using this notifier."
                .to_string(),
            author: "Hunter Long".to_string(),
            author_url: "https://github.com/hunterlong".to_string(),
            icon: "fa dot-circle".to_string(),
            delay: Duration::from_secs(10),
            limits: 60,
            success_template: "Your service '{{.Service.Name}}' is currently online!".to_string(),
            failure_template: "Your service '{{.Service.Name}}' is currently offline!".to_string(),
            form: vec![
                FormField {
                    field_type: FieldType::Text,
                    title: "User Token".to_string(),
                    placeholder: "Insert your Pushover User Token".to_string(),
                    config_key: "user_key".to_string(),
                    required: true,
                    options: None,
                },
                FormField {
                    field_type: FieldType::Password,
                    title: "Application API Key".to_string(),
                    placeholder: "Create an Application and insert the API Key here".to_string(),
                    config_key: "api_token".to_string(),
                    required: true,
                    options: None,
                },
                FormField {
                    field_type: FieldType::List,
                    title: "Priority".to_string(),
                    placeholder: "Set the notification priority level".to_string(),
                    config_key: "priority".to_string(),
                    required: false,
                    options: Some(
                        PRIORITIES
                            .iter()
                            .map(|(name, _)| name.to_string())
                            .collect(),
                    ),
                },
                FormField {
                    field_type: FieldType::List,
                    title: "Notification Sound".to_string(),
                    placeholder: "Choose a sound for this Pushover notification".to_string(),
                    config_key: "sound".to_string(),
                    required: false,
                    options: Some(SOUNDS.iter().map(|s| s.to_string()).collect()),
                },
            ],
            values: BTreeMap::new(),
            enabled: false,
        }
    }

    async fn send(&self, config: &NotificationConfig, message: &str) -> crate::Result<String> {
        let user_key = config.require("user_key")?;
        let api_token = config.require("api_token")?;
        let priority = Self::priority(config);
        let priority_str = priority.to_string();

        let mut params = vec![
            ("token", api_token),
            ("user", user_key),
            ("message", message),
            ("priority", priority_str.as_str()),
        ];
        if let Some(sound) = config.value("sound") {
            params.push(("sound", sound));
        }
        if priority == 2 {
            params.push(("retry", EMERGENCY_RETRY_SECS));
            params.push(("expire", EMERGENCY_EXPIRE_SECS));
        }

        tracing::debug!("Sending Pushover notification: priority={}", priority);

        let response = self.http.post_form(PUSHOVER_API_URL, &params).await?;

        if response.status != 200 {
            return Err(HeraldError::SendFailure(format!(
                "Pushover API returned status {}: {}",
                response.status, response.body
            )));
        }

        tracing::debug!("Pushover notification sent successfully");
        Ok(response.body)
    }

    async fn on_save(&self, config: &NotificationConfig) -> crate::Result<String> {
        config.validate()?;
        if let Some(priority) = config.value("priority") {
            if parse_priority(priority).is_none() {
                return Err(HeraldError::Validation(format!(
                    "unknown Pushover priority '{}'",
                    priority
                )));
            }
        }

        let params = [
            ("token", config.require("api_token")?),
            ("user", config.require("user_key")?),
        ];
        let response = self.http.post_form(PUSHOVER_VALIDATE_URL, &params).await?;
        if !response.is_success() {
            return Err(HeraldError::Validation(format!(
                "Pushover rejected the credentials ({}): {}",
                response.status, response.body
            )));
        }
        Ok("Pushover credentials verified".to_string())
    }
}
