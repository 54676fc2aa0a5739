//! Registry of built-in and extension notifiers, and event fan-out

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::NotifierSettings;
use crate::error::HeraldError;
use crate::event::{Failure, ServiceEvent};
use crate::history::{DispatchHistory, DispatchRecord, Hook};
use crate::notifier::{DeliveryOutcome, NotificationConfig, Notifier, RegisteredNotifier};

/// Outcome of one notifier for one dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierOutcome {
    pub method: String,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}

/// An extension artifact that loaded and registered successfully
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedExtension {
    pub artifact: PathBuf,
    pub method: String,
    pub title: String,
    pub author: String,
}

/// Holds every registered notifier in registration order
///
/// Registration happens at startup; dispatch may be called concurrently
/// afterwards. Locks are only held to snapshot or mutate the lists, never
/// across a send.
#[derive(Debug)]
pub struct NotifierRegistry {
    notifiers: RwLock<Vec<Arc<RegisteredNotifier>>>,
    extensions: RwLock<Vec<LoadedExtension>>,
    history: DispatchHistory,
    send_timeout: Duration,
}

impl NotifierRegistry {
    pub fn new(send_timeout: Duration, history_size: usize) -> Self {
        Self {
            notifiers: RwLock::new(Vec::new()),
            extensions: RwLock::new(Vec::new()),
            history: DispatchHistory::new(history_size),
            send_timeout,
        }
    }

    /// Register a notifier under its `select().method`
    ///
    /// A colliding method is rejected and the existing registration is kept.
    pub fn register(&self, notifier: Arc<dyn Notifier>) -> crate::Result<()> {
        self.insert(Arc::new(RegisteredNotifier::new(notifier, self.send_timeout)))
    }

    /// Register an already wrapped notifier
    pub fn insert(&self, registered: Arc<RegisteredNotifier>) -> crate::Result<()> {
        let mut notifiers = self
            .notifiers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let method = registered.method().to_string();
        if notifiers.iter().any(|n| n.method() == method) {
            tracing::warn!("Rejecting duplicate notifier method '{}'", method);
            return Err(HeraldError::DuplicateMethod(method));
        }
        notifiers.push(registered);
        tracing::info!("Registered notifier '{}'", method);
        Ok(())
    }

    /// Register a notifier provided by a loaded extension
    pub fn register_extension(
        &self,
        notifier: Arc<dyn Notifier>,
        loaded: LoadedExtension,
    ) -> crate::Result<()> {
        self.register(notifier)?;
        self.extensions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(loaded);
        Ok(())
    }

    /// Live configuration records in registration order
    pub fn all(&self) -> Vec<NotificationConfig> {
        self.snapshot().iter().map(|n| n.select()).collect()
    }

    pub fn get(&self, method: &str) -> Option<Arc<RegisteredNotifier>> {
        self.notifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|n| n.method() == method)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.notifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extensions(&self) -> Vec<LoadedExtension> {
        self.extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recent dispatch records, oldest first
    pub fn history(&self) -> Vec<DispatchRecord> {
        self.history.snapshot()
    }

    /// Overlay operator settings; settings for unknown methods are ignored
    pub fn apply_settings(&self, settings: &[NotifierSettings]) {
        for entry in settings {
            match self.get(&entry.method) {
                Some(notifier) => notifier.apply(entry),
                None => tracing::warn!(
                    "Settings given for unknown notifier '{}', ignoring",
                    entry.method
                ),
            }
        }
    }

    /// Notify every notifier that a service is healthy
    pub async fn dispatch_success(&self, event: &ServiceEvent) -> Vec<NotifierOutcome> {
        let handles = self
            .snapshot()
            .into_iter()
            .map(|notifier| {
                let event = event.clone();
                let method = notifier.method().to_string();
                let handle = tokio::spawn(async move { notifier.on_success(&event).await });
                (method, handle)
            })
            .collect();
        self.join(handles, &event.service.name, Hook::Success).await
    }

    /// Notify every notifier that a service failed
    pub async fn dispatch_failure(
        &self,
        event: &ServiceEvent,
        failure: &Failure,
    ) -> Vec<NotifierOutcome> {
        let handles = self
            .snapshot()
            .into_iter()
            .map(|notifier| {
                let event = event.clone();
                let failure = failure.clone();
                let method = notifier.method().to_string();
                let handle =
                    tokio::spawn(async move { notifier.on_failure(&event, &failure).await });
                (method, handle)
            })
            .collect();
        self.join(handles, &event.service.name, Hook::Failure).await
    }

    /// Run one notifier's test hook
    pub async fn test(&self, method: &str) -> crate::Result<String> {
        let notifier = self
            .get(method)
            .ok_or_else(|| HeraldError::NotFound(method.to_string()))?;
        notifier.on_test().await
    }

    /// Apply edited settings to one notifier and run its save hook
    pub async fn save(&self, method: &str, settings: &NotifierSettings) -> crate::Result<String> {
        let notifier = self
            .get(method)
            .ok_or_else(|| HeraldError::NotFound(method.to_string()))?;
        notifier.apply(settings);
        notifier.on_save().await
    }

    fn snapshot(&self) -> Vec<Arc<RegisteredNotifier>> {
        self.notifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn join(
        &self,
        handles: Vec<(String, JoinHandle<DeliveryOutcome>)>,
        service: &str,
        hook: Hook,
    ) -> Vec<NotifierOutcome> {
        let mut outcomes = Vec::with_capacity(handles.len());
        for (method, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|e| {
                tracing::error!("Notifier '{}' task failed: {}", method, e);
                DeliveryOutcome::SendFailure {
                    reason: format!("notifier task failed: {}", e),
                    timed_out: false,
                }
            });
            self.history.push(DispatchRecord {
                method: method.clone(),
                service: service.to_string(),
                hook,
                outcome: outcome.clone(),
                at: Utc::now(),
            });
            outcomes.push(NotifierOutcome { method, outcome });
        }
        outcomes
    }
}
