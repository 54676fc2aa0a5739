//! Herald - notification dispatch service
//!
//! Fans service up/down events out to a registry of rate-limited notifiers.
//! Built-in notifiers are linked in; further notifiers are loaded at startup
//! from out-of-process extension artifacts.

pub mod catalog;
pub mod config;
pub mod error;
pub mod event;
pub mod extension;
pub mod history;
pub mod io;
pub mod limiter;
pub mod notifier;
pub mod pushover;
pub mod registry;
pub mod slack;
pub mod template;

pub use config::{load_config, Config};
pub use error::{HeraldError, Result};

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::catalog::CatalogClient;
use crate::event::ServiceEvent;
use crate::extension::{ExtensionLoader, LoadReport};
use crate::io::{ExtensionRunner, HttpClient, ProcessExtensionRunner, ReqwestHttpClient};
use crate::notifier::Notifier;
use crate::pushover::PushoverNotifier;
use crate::registry::{NotifierOutcome, NotifierRegistry};
use crate::slack::SlackNotifier;

/// Builder for the herald service
///
/// Registers the built-in notifiers, any injected notifiers and the loaded
/// extensions (in that order), then overlays the configured settings.
pub struct HeraldBuilder {
    config: Config,
    http: Option<Arc<dyn HttpClient>>,
    runner: Option<Arc<dyn ExtensionRunner>>,
    notifiers: Vec<Arc<dyn Notifier>>,
    cancel: Option<CancellationToken>,
}

impl HeraldBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            runner: None,
            notifiers: Vec::new(),
            cancel: None,
        }
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_extension_runner(mut self, runner: Arc<dyn ExtensionRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Register additional notifier implementations after the built-ins
    pub fn with_notifiers(mut self, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        self.notifiers.extend(notifiers);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn build(self) -> Result<Herald> {
        let config = self.config;
        let http: Arc<dyn HttpClient> = match self.http {
            Some(http) => http,
            // Backstop only: sends and catalog fetches carry their own deadlines.
            None => Arc::new(ReqwestHttpClient::with_timeout(
                config.dispatch.send_timeout.max(config.catalog.timeout),
            )?),
        };
        let runner: Arc<dyn ExtensionRunner> = match self.runner {
            Some(runner) => runner,
            None => Arc::new(ProcessExtensionRunner::new()),
        };

        let registry = Arc::new(NotifierRegistry::new(
            config.dispatch.send_timeout,
            config.dispatch.history_size,
        ));

        let built_in: Vec<Arc<dyn Notifier>> = vec![
            Arc::new(PushoverNotifier::new(Arc::clone(&http))),
            Arc::new(SlackNotifier::new(Arc::clone(&http))),
        ];
        for notifier in built_in.into_iter().chain(self.notifiers) {
            if let Err(e) = registry.register(notifier) {
                tracing::warn!("Skipping notifier: {}", e);
            }
        }

        let load_report = if config.extensions.enabled {
            ExtensionLoader::new(runner, &config.extensions)
                .load_all(&config.extensions.directory, &registry)
                .await
        } else {
            tracing::debug!("Extension loading disabled");
            LoadReport::default()
        };

        registry.apply_settings(&config.notifiers);

        tracing::info!(
            "Herald ready with {} notifiers ({} enabled)",
            registry.len(),
            registry.all().iter().filter(|c| c.enabled).count()
        );

        Ok(Herald {
            config,
            http,
            registry,
            load_report,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

/// A built herald service
pub struct Herald {
    config: Config,
    http: Arc<dyn HttpClient>,
    registry: Arc<NotifierRegistry>,
    load_report: LoadReport,
    cancel: CancellationToken,
}

impl Herald {
    pub fn registry(&self) -> Arc<NotifierRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Client for the configured extension catalog
    pub fn catalog(&self) -> CatalogClient {
        CatalogClient::new(Arc::clone(&self.http), &self.config.catalog)
    }

    /// Dispatch one event to every registered notifier
    pub async fn dispatch(&self, event: &ServiceEvent) -> Vec<NotifierOutcome> {
        let outcomes = match &event.failure {
            Some(failure) => self.registry.dispatch_failure(event, failure).await,
            None => self.registry.dispatch_success(event).await,
        };

        let sent = outcomes.iter().filter(|o| o.outcome.is_sent()).count();
        let suppressed = outcomes
            .iter()
            .filter(|o| o.outcome.is_suppressed())
            .count();
        let failed = outcomes.iter().filter(|o| o.outcome.is_failure()).count();
        let kind = if event.is_failure() {
            "failure"
        } else {
            "success"
        };
        tracing::info!(
            "Dispatched {} event for '{}': {} sent, {} suppressed, {} failed",
            kind,
            event.service.name,
            sent,
            suppressed,
            failed
        );
        outcomes
    }

    /// Dispatch newline-delimited JSON events until EOF or cancellation
    ///
    /// Returns the number of events dispatched. Malformed lines are logged
    /// and skipped.
    pub async fn run_events<R>(&self, reader: R) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut dispatched = 0;

        loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Event loop cancelled");
                    break;
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                tracing::debug!("End of event stream");
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<ServiceEvent>(line) {
                Ok(event) => {
                    self.dispatch(&event).await;
                    dispatched += 1;
                }
                Err(e) => tracing::warn!("Ignoring malformed event line: {}", e),
            }
        }

        Ok(dispatched)
    }

    /// Read events from stdin until EOF or ctrl-c
    pub async fn start(self) -> Result<()> {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                    cancel.cancel();
                }
                Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
            }
        });

        tracing::info!("Herald started, reading events from stdin");
        let dispatched = self
            .run_events(BufReader::new(tokio::io::stdin()))
            .await?;
        tracing::info!("Herald stopped after {} events", dispatched);
        Ok(())
    }
}
