//! Notifier contract and the registered, rate-limited notifier wrapper

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::NotifierSettings;
use crate::error::HeraldError;
use crate::event::{Failure, ServiceEvent};
use crate::limiter::{RateLimiter, Reservation, SuppressReason};
use crate::template;

/// Kind of input an operator-editable slot expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Password,
    List,
    Number,
    Switch,
}

/// One operator-editable configuration slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub title: String,
    #[serde(default)]
    pub placeholder: String,
    pub config_key: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// Identity, policy and templates of one notifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub method: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_url: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, with = "humantime_serde")]
    pub delay: Duration,
    #[serde(default)]
    pub limits: u32,
    #[serde(default)]
    pub success_template: String,
    #[serde(default)]
    pub failure_template: String,
    #[serde(default)]
    pub form: Vec<FormField>,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl NotificationConfig {
    /// Value of a configured slot, treating empty strings as unset
    pub fn value(&self, config_key: &str) -> Option<&str> {
        self.values
            .get(config_key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Value of a slot the transport cannot send without
    pub fn require(&self, config_key: &str) -> crate::Result<&str> {
        self.value(config_key).ok_or_else(|| {
            HeraldError::SendFailure(format!(
                "{}: '{}' is not configured",
                self.method, config_key
            ))
        })
    }

    /// Required form fields that have no value
    pub fn missing_required(&self) -> Vec<&FormField> {
        self.form
            .iter()
            .filter(|f| f.required && self.value(&f.config_key).is_none())
            .collect()
    }

    /// Check required slots and template placeholders
    pub fn validate(&self) -> crate::Result<()> {
        let missing: Vec<&str> = self
            .missing_required()
            .iter()
            .map(|f| f.title.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(HeraldError::Validation(format!(
                "{} is missing required settings: {}",
                self.title,
                missing.join(", ")
            )));
        }

        let unknown: Vec<String> = template::unknown_placeholders(&self.success_template)
            .into_iter()
            .chain(template::unknown_placeholders(&self.failure_template))
            .collect();
        if !unknown.is_empty() {
            return Err(HeraldError::Validation(format!(
                "{} templates use unknown placeholders: {}",
                self.title,
                unknown.join(", ")
            )));
        }
        Ok(())
    }

    /// Overlay operator settings onto this record
    ///
    /// Listing a notifier in the settings switches it on unless the
    /// settings say otherwise.
    pub fn apply(&mut self, settings: &NotifierSettings) {
        self.enabled = settings.enabled.unwrap_or(true);
        if let Some(delay) = settings.delay {
            self.delay = delay;
        }
        if let Some(limits) = settings.limits {
            self.limits = limits;
        }
        if let Some(template) = &settings.success_template {
            self.success_template = template.clone();
        }
        if let Some(template) = &settings.failure_template {
            self.failure_template = template.clone();
        }
        for (key, value) in &settings.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Copy with password slots masked, for display
    pub fn redacted(&self) -> NotificationConfig {
        let mut copy = self.clone();
        for field in self
            .form
            .iter()
            .filter(|f| f.field_type == FieldType::Password)
        {
            if let Some(value) = copy.values.get_mut(&field.config_key) {
                *value = "********".to_string();
            }
        }
        copy
    }
}

/// Result of handing one event to one notifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The transport accepted the message
    Sent { response: String },
    /// The send was intentionally skipped; not an error
    Suppressed { reason: SuppressReason },
    /// The transport failed or did not answer in time
    SendFailure { reason: String, timed_out: bool },
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent { .. })
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, DeliveryOutcome::Suppressed { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, DeliveryOutcome::SendFailure { .. })
    }

    /// A send failure caused by the transport not answering in time
    pub fn is_timeout(&self) -> bool {
        match self {
            DeliveryOutcome::SendFailure { timed_out, .. } => *timed_out,
            _ => false,
        }
    }
}

/// Contract every alert transport implements
///
/// Implementations provide their self-registration record and a send
/// primitive. The lifecycle hooks have default implementations that render
/// the configured templates and call [`Notifier::send`]; transports override
/// them when they need to, e.g. to validate credentials in `on_save`.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// The notifier's own configuration record
    fn select(&self) -> NotificationConfig;

    /// Deliver an already rendered message, returning the transport's response
    async fn send(&self, config: &NotificationConfig, message: &str) -> crate::Result<String>;

    /// A watched service is (still) healthy
    async fn on_success(
        &self,
        config: &NotificationConfig,
        event: &ServiceEvent,
    ) -> crate::Result<String> {
        let message = template::render(&config.success_template, &event.service, None);
        self.send(config, &message).await
    }

    /// A watched service failed
    async fn on_failure(
        &self,
        config: &NotificationConfig,
        event: &ServiceEvent,
        failure: &Failure,
    ) -> crate::Result<String> {
        let message = template::render(&config.failure_template, &event.service, Some(failure));
        self.send(config, &message).await
    }

    /// Send a canned failure for the example service
    async fn on_test(&self, config: &NotificationConfig) -> crate::Result<String> {
        let example = ServiceEvent::example();
        let issue = example
            .failure
            .as_ref()
            .map(|f| f.issue.as_str())
            .unwrap_or_default();
        let message = format!(
            "Testing the {} notifier. Your service '{}' is currently offline! Error: {}",
            config.title, example.service.name, issue
        );
        self.send(config, &message).await
    }

    /// Settings were edited and persisted
    async fn on_save(&self, config: &NotificationConfig) -> crate::Result<String> {
        config.validate()?;
        Ok(format!("{} settings saved", config.title))
    }
}

/// A notifier bound to its live configuration record and its own limiter
#[derive(Debug)]
pub struct RegisteredNotifier {
    method: String,
    inner: Arc<dyn Notifier>,
    config: RwLock<NotificationConfig>,
    limiter: RateLimiter,
    send_timeout: Duration,
}

impl RegisteredNotifier {
    pub fn new(inner: Arc<dyn Notifier>, send_timeout: Duration) -> Self {
        Self::with_limiter(inner, send_timeout, RateLimiter::new())
    }

    pub fn with_limiter(
        inner: Arc<dyn Notifier>,
        send_timeout: Duration,
        limiter: RateLimiter,
    ) -> Self {
        let config = inner.select();
        Self {
            method: config.method.clone(),
            inner,
            config: RwLock::new(config),
            limiter,
            send_timeout,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, NotificationConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, NotificationConfig> {
        self.config.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Snapshot of the live configuration record
    pub fn select(&self) -> NotificationConfig {
        self.read().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.read().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.write().enabled = enabled;
        tracing::info!(
            "Notifier '{}' {}",
            self.method,
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub fn apply(&self, settings: &NotifierSettings) {
        self.write().apply(settings);
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Dispatch a success event through the limiter
    pub async fn on_success(&self, event: &ServiceEvent) -> DeliveryOutcome {
        let config = self.select();
        let reservation = match self.admit(&config, &event.service.name) {
            Ok(reservation) => reservation,
            Err(outcome) => return outcome,
        };
        let result = self
            .bounded(self.inner.on_success(&config, event))
            .await;
        self.settle(reservation, result, &event.service.name)
    }

    /// Dispatch a failure event through the limiter
    pub async fn on_failure(&self, event: &ServiceEvent, failure: &Failure) -> DeliveryOutcome {
        let config = self.select();
        let reservation = match self.admit(&config, &event.service.name) {
            Ok(reservation) => reservation,
            Err(outcome) => return outcome,
        };
        let result = self
            .bounded(self.inner.on_failure(&config, event, failure))
            .await;
        self.settle(reservation, result, &event.service.name)
    }

    /// Operator-triggered test send; bypasses the limiter and enabled flag
    pub async fn on_test(&self) -> crate::Result<String> {
        let config = self.select();
        tracing::info!("Sending test notification via '{}'", self.method);
        self.bounded(self.inner.on_test(&config)).await
    }

    pub async fn on_save(&self) -> crate::Result<String> {
        let config = self.select();
        self.bounded(self.inner.on_save(&config)).await
    }

    fn admit(
        &self,
        config: &NotificationConfig,
        service: &str,
    ) -> std::result::Result<Reservation<'_>, DeliveryOutcome> {
        let suppressed = |reason: SuppressReason| {
            tracing::info!(
                "Notification via '{}' for '{}' suppressed: {}",
                self.method,
                service,
                reason
            );
            DeliveryOutcome::Suppressed { reason }
        };

        if !config.enabled {
            return Err(suppressed(SuppressReason::Disabled));
        }
        self.limiter
            .try_acquire(config.delay, config.limits, Instant::now())
            .map_err(suppressed)
    }

    async fn bounded<F>(&self, send: F) -> crate::Result<String>
    where
        F: Future<Output = crate::Result<String>>,
    {
        tokio::time::timeout(self.send_timeout, send)
            .await
            .unwrap_or_else(|_| {
                Err(HeraldError::Timeout(format!(
                    "'{}' did not respond within {:?}",
                    self.method, self.send_timeout
                )))
            })
    }

    fn settle(
        &self,
        reservation: Reservation<'_>,
        result: crate::Result<String>,
        service: &str,
    ) -> DeliveryOutcome {
        match result {
            Ok(response) => {
                reservation.commit(Instant::now());
                tracing::debug!("Notification via '{}' for '{}' sent", self.method, service);
                DeliveryOutcome::Sent { response }
            }
            Err(e) => {
                // Dropping the reservation hands the slot back.
                drop(reservation);
                tracing::warn!(
                    "Notification via '{}' for '{}' failed: {}",
                    self.method,
                    service,
                    e
                );
                DeliveryOutcome::SendFailure {
                    reason: e.to_string(),
                    timed_out: e.is_timeout(),
                }
            }
        }
    }
}
