//! BDD test world for herald service

use std::sync::Arc;
use std::time::Duration;

use cucumber::World;
use herald::event::{Failure, Service, ServiceEvent};
use herald::extension::LoadReport;
use herald::notifier::{NotificationConfig, Notifier};
use herald::registry::{NotifierOutcome, NotifierRegistry};

use crate::steps::dispatch_steps::ScriptedNotifier;
use crate::steps::extension_steps::ScriptedRunner;
use crate::steps::notification_steps::RecordingHttpClient;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default, World)]
pub struct HeraldWorld {
    // Built-in notifier testing
    pub http: Option<Arc<RecordingHttpClient>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub notifier_config: Option<NotificationConfig>,
    pub result: Option<herald::Result<String>>,

    // Registry and dispatch testing
    pub send_timeout: Option<Duration>,
    pub registry: Option<Arc<NotifierRegistry>>,
    pub scripted: Vec<Arc<ScriptedNotifier>>,
    pub outcomes: Vec<NotifierOutcome>,
    pub dispatch_elapsed: Option<Duration>,
    pub registration_error: Option<herald::HeraldError>,

    // Extension testing
    pub extension_dir: Option<tempfile::TempDir>,
    pub extension_runner: Option<Arc<ScriptedRunner>>,
    pub load_report: Option<LoadReport>,

    // Template testing
    pub service: Option<Service>,
    pub failure: Option<Failure>,
    pub rendered: Option<String>,
}

impl HeraldWorld {
    /// The registry under test, created on first use
    pub fn registry(&mut self) -> Arc<NotifierRegistry> {
        let timeout = self.send_timeout.unwrap_or(DEFAULT_SEND_TIMEOUT);
        self.registry
            .get_or_insert_with(|| Arc::new(NotifierRegistry::new(timeout, 100)))
            .clone()
    }

    pub fn scripted(&self, method: &str) -> Arc<ScriptedNotifier> {
        self.scripted
            .iter()
            .find(|n| n.method() == method)
            .cloned()
            .unwrap_or_else(|| panic!("no scripted notifier '{}'", method))
    }

    pub fn outcome(&self, method: &str) -> &NotifierOutcome {
        self.outcomes
            .iter()
            .find(|o| o.method == method)
            .unwrap_or_else(|| panic!("no outcome for '{}'", method))
    }

    /// Dispatch a failure for `service` and keep the outcomes
    pub async fn dispatch_failure(&mut self, service: &str, issue: &str) {
        let registry = self.registry();
        let failure = Failure::new(issue);
        let event = ServiceEvent::failure(service_named(service), failure.clone());
        let started = tokio::time::Instant::now();
        self.outcomes = registry.dispatch_failure(&event, &failure).await;
        self.dispatch_elapsed = Some(started.elapsed());
    }

    /// Dispatch a success for `service` and keep the outcomes
    pub async fn dispatch_success(&mut self, service: &str) {
        let registry = self.registry();
        let event = ServiceEvent::success(service_named(service));
        let started = tokio::time::Instant::now();
        self.outcomes = registry.dispatch_success(&event).await;
        self.dispatch_elapsed = Some(started.elapsed());
    }
}

pub fn service_named(name: &str) -> Service {
    Service {
        id: 1,
        name: name.to_string(),
        domain: format!("https://{}.example.com", name),
        port: Some(443),
        latency_ms: Some(25.0),
        online: false,
    }
}
