//! Out-of-process extension notifiers
//!
//! An extension is an executable artifact in the extensions directory. The
//! host talks to it over stdin/stdout with one JSON document per call:
//!
//! - `<artifact> describe` prints a [`loader::Handshake`] naming the ABI
//!   version, the exported symbol and the notifier's configuration record.
//! - `<artifact> invoke` reads an invocation request `{hook, config, message?}`
//!   and prints `{response?, error?}`.
//!
//! Rendering and rate limiting stay in the host; the extension only
//! transports already rendered text.

pub mod loader;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HeraldError;
use crate::io::ExtensionRunner;
use crate::notifier::{NotificationConfig, Notifier};

pub use loader::{
    ExtensionFailure, ExtensionLoader, Handshake, LoadReport, EXPORTED_SYMBOL,
    EXTENSION_ABI_VERSION, EXTENSION_SUFFIX,
};

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    hook: &'a str,
    config: &'a NotificationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct InvokeReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// A loaded extension adapted to the [`Notifier`] contract
pub struct ExtensionNotifier {
    artifact: PathBuf,
    config: NotificationConfig,
    runner: Arc<dyn ExtensionRunner>,
    call_timeout: Duration,
}

impl std::fmt::Debug for ExtensionNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionNotifier")
            .field("artifact", &self.artifact)
            .field("method", &self.config.method)
            .finish()
    }
}

impl ExtensionNotifier {
    pub fn new(
        artifact: PathBuf,
        config: NotificationConfig,
        runner: Arc<dyn ExtensionRunner>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            artifact,
            config,
            runner,
            call_timeout,
        }
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    async fn invoke(
        &self,
        hook: &str,
        config: &NotificationConfig,
        message: Option<&str>,
    ) -> crate::Result<InvokeReply> {
        let request = serde_json::to_string(&InvokeRequest {
            hook,
            config,
            message,
        })?;
        let stdout = self
            .runner
            .run(&self.artifact, "invoke", &request, self.call_timeout)
            .await?;
        serde_json::from_str(stdout.trim()).map_err(|e| {
            HeraldError::SendFailure(format!(
                "{} sent an unreadable {} reply: {}",
                self.artifact.display(),
                hook,
                e
            ))
        })
    }
}

#[async_trait]
impl Notifier for ExtensionNotifier {
    fn select(&self) -> NotificationConfig {
        self.config.clone()
    }

    async fn send(&self, config: &NotificationConfig, message: &str) -> crate::Result<String> {
        let reply = self.invoke("send", config, Some(message)).await?;
        match reply.error {
            Some(error) => Err(HeraldError::SendFailure(format!(
                "{}: {}",
                config.method, error
            ))),
            None => Ok(reply.response.unwrap_or_default()),
        }
    }

    async fn on_save(&self, config: &NotificationConfig) -> crate::Result<String> {
        config.validate()?;
        let reply = self.invoke("save", config, None).await?;
        match reply.error {
            Some(error) => Err(HeraldError::Validation(error)),
            None => Ok(reply
                .response
                .unwrap_or_else(|| format!("{} settings saved", config.title))),
        }
    }
}
