//! BDD step definitions for registry fan-out

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cucumber::{given, then, when};

use herald::notifier::{NotificationConfig, Notifier};
use herald::HeraldError;

use crate::world::HeraldWorld;

/// How a scripted notifier answers sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Fail,
    Hang,
}

/// An in-process notifier whose transport behavior is scripted
#[derive(Debug)]
pub struct ScriptedNotifier {
    config: NotificationConfig,
    script: Mutex<Script>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedNotifier {
    pub fn new(config: NotificationConfig, script: Script) -> Self {
        Self {
            config,
            script: Mutex::new(script),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn method(&self) -> &str {
        &self.config.method
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for ScriptedNotifier {
    fn select(&self) -> NotificationConfig {
        self.config.clone()
    }

    async fn send(&self, config: &NotificationConfig, message: &str) -> herald::Result<String> {
        let script = *self.script.lock().unwrap();
        match script {
            Script::Succeed => {
                self.sent.lock().unwrap().push(message.to_string());
                Ok("accepted".to_string())
            }
            Script::Fail => Err(HeraldError::SendFailure(format!(
                "{} transport refused the message",
                config.method
            ))),
            Script::Hang => std::future::pending().await,
        }
    }
}

pub fn scripted_config(method: &str, delay: Duration, limits: u32) -> NotificationConfig {
    NotificationConfig {
        method: method.to_string(),
        title: method.to_string(),
        description: String::new(),
        author: String::new(),
        author_url: String::new(),
        icon: String::new(),
        delay,
        limits,
        success_template: "{{name}} is back up".to_string(),
        failure_template: "{{name}} is down: {{issue}}".to_string(),
        form: Vec::new(),
        values: BTreeMap::new(),
        enabled: true,
    }
}

fn parse_script(script: &str) -> Script {
    match script {
        "succeeds" => Script::Succeed,
        "fails" => Script::Fail,
        "never responds" => Script::Hang,
        other => panic!("unknown notifier script '{}'", other),
    }
}

pub fn register_scripted(world: &mut HeraldWorld, notifier: ScriptedNotifier) {
    let notifier = Arc::new(notifier);
    world
        .registry()
        .register(notifier.clone())
        .expect("registration failed");
    world.scripted.push(notifier);
}

// --- Given steps ---

#[given(expr = "a dispatch send timeout of {int} milliseconds")]
fn send_timeout(world: &mut HeraldWorld, millis: u64) {
    world.send_timeout = Some(Duration::from_millis(millis));
}

#[given(expr = "a notifier {string} that {}")]
fn scripted_notifier(world: &mut HeraldWorld, method: String, script: String) {
    let notifier = ScriptedNotifier::new(
        scripted_config(&method, Duration::ZERO, 0),
        parse_script(&script),
    );
    register_scripted(world, notifier);
}

#[given(expr = "notifier {string} is disabled")]
fn notifier_disabled(world: &mut HeraldWorld, method: String) {
    world
        .registry()
        .get(&method)
        .expect("unknown notifier")
        .set_enabled(false);
}

// --- When steps ---

#[when(expr = "notifier {string} starts to {word}")]
fn notifier_switches(world: &mut HeraldWorld, method: String, script: String) {
    let script = match script.as_str() {
        "succeed" => Script::Succeed,
        "fail" => Script::Fail,
        other => panic!("unknown script '{}'", other),
    };
    world.scripted(&method).set_script(script);
}

#[when(expr = "another notifier registers with method {string}")]
fn register_duplicate(world: &mut HeraldWorld, method: String) {
    let mut config = scripted_config(&method, Duration::ZERO, 0);
    config.title = "Impostor".to_string();
    let result = world
        .registry()
        .register(Arc::new(ScriptedNotifier::new(config, Script::Succeed)));
    world.registration_error = result.err();
}

#[when(expr = "service {string} fails with {string}")]
async fn service_fails(world: &mut HeraldWorld, service: String, issue: String) {
    world.dispatch_failure(&service, &issue).await;
}

#[when(expr = "service {string} recovers")]
async fn service_recovers(world: &mut HeraldWorld, service: String) {
    world.dispatch_success(&service).await;
}

// --- Then steps ---

#[then("the registration should be rejected as a duplicate")]
fn registration_rejected(world: &mut HeraldWorld) {
    let err = world
        .registration_error
        .as_ref()
        .expect("registration was accepted");
    assert!(matches!(err, HeraldError::DuplicateMethod(_)), "{err:?}");
}

#[then(expr = "the registry should list {int} notifier(s)")]
fn registry_lists(world: &mut HeraldWorld, count: usize) {
    assert_eq!(world.registry().all().len(), count);
}

#[then(expr = "notifier {string} should still be titled {string}")]
fn notifier_titled(world: &mut HeraldWorld, method: String, title: String) {
    let config = world
        .registry()
        .get(&method)
        .expect("unknown notifier")
        .select();
    assert_eq!(config.title, title);
}

#[then(expr = "the outcomes should be reported in the order {string}")]
fn outcomes_in_order(world: &mut HeraldWorld, order: String) {
    let expected: Vec<&str> = order.split(", ").collect();
    let actual: Vec<&str> = world.outcomes.iter().map(|o| o.method.as_str()).collect();
    assert_eq!(actual, expected);
}

#[then(expr = "notifier {string} should report {word}")]
fn notifier_reports(world: &mut HeraldWorld, method: String, status: String) {
    let outcome = &world.outcome(&method).outcome;
    match status.as_str() {
        "sent" => assert!(outcome.is_sent(), "{outcome:?}"),
        "suppressed" => assert!(outcome.is_suppressed(), "{outcome:?}"),
        "failure" => assert!(outcome.is_failure() && !outcome.is_timeout(), "{outcome:?}"),
        "timeout" => assert!(outcome.is_timeout(), "{outcome:?}"),
        other => panic!("unknown status '{}'", other),
    }
}

#[then(expr = "the dispatch should finish within {int} milliseconds")]
fn dispatch_within(world: &mut HeraldWorld, millis: u64) {
    let elapsed = world.dispatch_elapsed.expect("nothing was dispatched");
    assert!(
        elapsed <= Duration::from_millis(millis),
        "dispatch took {elapsed:?}"
    );
}

#[then(expr = "notifier {string} should have sent {int} message(s)")]
fn notifier_sent_count(world: &mut HeraldWorld, method: String, count: usize) {
    assert_eq!(world.scripted(&method).sent().len(), count);
}

#[then(expr = "message {int} of notifier {string} should be {string}")]
fn notifier_message(world: &mut HeraldWorld, index: usize, method: String, message: String) {
    let sent = world.scripted(&method).sent();
    assert_eq!(sent.get(index - 1), Some(&message), "{sent:?}");
}

#[then("no outcomes should be reported")]
fn no_outcomes(world: &mut HeraldWorld) {
    assert!(world.outcomes.is_empty());
}
