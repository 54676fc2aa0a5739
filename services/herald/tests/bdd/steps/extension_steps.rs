//! BDD step definitions for extension loading

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cucumber::{given, then, when};

use herald::config::ExtensionsConfig;
use herald::extension::ExtensionLoader;
use herald::io::ExtensionRunner;
use herald::notifier::DeliveryOutcome;
use herald::HeraldError;

use crate::world::HeraldWorld;

/// Canned replies for the artifacts of one test directory
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    describe: Mutex<HashMap<String, Result<String, String>>>,
    invoke: Mutex<HashMap<String, String>>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedRunner {
    fn on_describe(&self, file: &str, reply: Result<String, String>) {
        self.describe
            .lock()
            .unwrap()
            .insert(file.to_string(), reply);
    }

    fn on_invoke(&self, file: &str, reply: &str) {
        self.invoke
            .lock()
            .unwrap()
            .insert(file.to_string(), reply.to_string());
    }
}

#[async_trait::async_trait]
impl ExtensionRunner for ScriptedRunner {
    async fn run(
        &self,
        artifact: &Path,
        command: &str,
        _input: &str,
        _timeout: Duration,
    ) -> herald::Result<String> {
        let file = artifact
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap()
            .push((file.clone(), command.to_string()));

        match command {
            "describe" => match self.describe.lock().unwrap().get(&file) {
                Some(Ok(reply)) => Ok(reply.clone()),
                Some(Err(reason)) => Err(HeraldError::Extension(reason.clone())),
                None => Err(HeraldError::Extension(format!("{} is not executable", file))),
            },
            "invoke" => self
                .invoke
                .lock()
                .unwrap()
                .get(&file)
                .cloned()
                .ok_or_else(|| HeraldError::Extension(format!("{} crashed", file))),
            other => Err(HeraldError::Extension(format!("unknown command {}", other))),
        }
    }
}

fn handshake(method: &str) -> String {
    serde_json::json!({
        "abi_version": 1,
        "symbol": "Notifier",
        "config": {
            "method": method,
            "title": method,
            "author": "extension author",
            "failure_template": "{{name}} is down: {{issue}}"
        }
    })
    .to_string()
}

fn runner(world: &mut HeraldWorld) -> Arc<ScriptedRunner> {
    world
        .extension_runner
        .get_or_insert_with(|| Arc::new(ScriptedRunner::default()))
        .clone()
}

fn touch(world: &mut HeraldWorld, file: &str) {
    let dir = world
        .extension_dir
        .get_or_insert_with(|| tempfile::tempdir().expect("failed to create temp dir"));
    std::fs::write(dir.path().join(file), "").expect("failed to write artifact");
}

// --- Given steps ---

#[given("an empty extensions directory")]
fn empty_directory(world: &mut HeraldWorld) {
    world.extension_dir = Some(tempfile::tempdir().expect("failed to create temp dir"));
}

#[given(expr = "an extension {string} providing method {string}")]
fn valid_extension(world: &mut HeraldWorld, file: String, method: String) {
    touch(world, &file);
    runner(world).on_describe(&file, Ok(handshake(&method)));
}

#[given(expr = "an extension {string} whose handshake fails")]
fn failing_extension(world: &mut HeraldWorld, file: String) {
    touch(world, &file);
    runner(world).on_describe(&file, Err("exited with status 1".to_string()));
}

#[given(expr = "an extension {string} exporting symbol {string}")]
fn wrong_symbol_extension(world: &mut HeraldWorld, file: String, symbol: String) {
    touch(world, &file);
    let reply = serde_json::json!({
        "abi_version": 1,
        "symbol": symbol,
        "config": {"method": "wrong", "title": "Wrong"}
    })
    .to_string();
    runner(world).on_describe(&file, Ok(reply));
}

#[given(expr = "a plain file {string} in the extensions directory")]
fn plain_file(world: &mut HeraldWorld, file: String) {
    touch(world, &file);
}

#[given(expr = "extension {string} replies to sends with response {string}")]
fn extension_response(world: &mut HeraldWorld, file: String, response: String) {
    let reply = serde_json::json!({ "response": response }).to_string();
    runner(world).on_invoke(&file, &reply);
}

#[given(expr = "extension {string} replies to sends with error {string}")]
fn extension_error(world: &mut HeraldWorld, file: String, error: String) {
    let reply = serde_json::json!({ "error": error }).to_string();
    runner(world).on_invoke(&file, &reply);
}

// --- When steps ---

#[when("the extensions are loaded")]
async fn load_extensions(world: &mut HeraldWorld) {
    let registry = world.registry();
    let runner = runner(world);
    let dir = world
        .extension_dir
        .get_or_insert_with(|| tempfile::tempdir().expect("failed to create temp dir"));
    let loader = ExtensionLoader::new(runner, &ExtensionsConfig::default());
    world.load_report = Some(loader.load_all(dir.path(), &registry).await);
}

// --- Then steps ---

#[then(expr = "{int} extension(s) should be loaded")]
fn loaded_count(world: &mut HeraldWorld, count: usize) {
    let report = world.load_report.as_ref().expect("extensions not loaded");
    assert_eq!(report.loaded.len(), count, "{report:?}");
}

#[then(expr = "{int} file(s) should be skipped")]
fn skipped_count(world: &mut HeraldWorld, count: usize) {
    let report = world.load_report.as_ref().expect("extensions not loaded");
    assert_eq!(report.skipped.len(), count, "{report:?}");
}

#[then(expr = "{int} load failure(s) should be reported")]
fn failure_count(world: &mut HeraldWorld, count: usize) {
    let report = world.load_report.as_ref().expect("extensions not loaded");
    assert_eq!(report.failures.len(), count, "{report:?}");
}

#[then(expr = "the load failure for {string} should mention {string}")]
fn failure_mentions(world: &mut HeraldWorld, file: String, text: String) {
    let report = world.load_report.as_ref().expect("extensions not loaded");
    let failure = report
        .failures
        .iter()
        .find(|f| f.artifact.ends_with(&file))
        .unwrap_or_else(|| panic!("no failure for {}: {report:?}", file));
    assert!(failure.reason.contains(&text), "{}", failure.reason);
}

#[then(expr = "method {string} should be registered")]
fn method_registered(world: &mut HeraldWorld, method: String) {
    assert!(world.registry().get(&method).is_some());
    assert!(world
        .registry()
        .extensions()
        .iter()
        .any(|e| e.method == method));
}

#[then(expr = "the extension {string} should never have been started")]
fn never_started(world: &mut HeraldWorld, file: String) {
    let runner = runner(world);
    let calls = runner.calls.lock().unwrap();
    assert!(calls.iter().all(|(f, _)| *f != file), "{calls:?}");
}

#[then(expr = "notifier {string} should report a send failure mentioning {string}")]
fn send_failure_mentions(world: &mut HeraldWorld, method: String, text: String) {
    match &world.outcome(&method).outcome {
        DeliveryOutcome::SendFailure { reason, .. } => {
            assert!(reason.contains(&text), "{reason}")
        }
        other => panic!("expected a send failure, got {other:?}"),
    }
}
