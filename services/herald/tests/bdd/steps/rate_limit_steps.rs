//! BDD step definitions for per-notifier rate limiting

use std::time::Duration;

use cucumber::{given, then};

use herald::limiter::SuppressReason;
use herald::notifier::DeliveryOutcome;

use crate::steps::dispatch_steps::{register_scripted, scripted_config, Script, ScriptedNotifier};
use crate::world::HeraldWorld;

#[given(expr = "a notifier {string} with a delay of {int} second(s) and a limit of {int} send(s)")]
fn limited_notifier(world: &mut HeraldWorld, method: String, delay: u64, limits: u32) {
    let config = scripted_config(&method, Duration::from_secs(delay), limits);
    register_scripted(world, ScriptedNotifier::new(config, Script::Succeed));
}

#[given(
    expr = "a notifier {string} with a delay of {int} second(s), a limit of {int} send(s) and failure template {string}"
)]
fn templated_notifier(
    world: &mut HeraldWorld,
    method: String,
    delay: u64,
    limits: u32,
    template: String,
) {
    let mut config = scripted_config(&method, Duration::from_secs(delay), limits);
    config.failure_template = template;
    register_scripted(world, ScriptedNotifier::new(config, Script::Succeed));
}

#[then(expr = "notifier {string} should be suppressed because it is {word}")]
fn suppressed_because(world: &mut HeraldWorld, method: String, reason: String) {
    let outcome = &world.outcome(&method).outcome;
    let DeliveryOutcome::Suppressed { reason: actual } = outcome else {
        panic!("expected a suppressed outcome, got {outcome:?}");
    };
    match reason.as_str() {
        "disabled" => assert_eq!(*actual, SuppressReason::Disabled),
        "delayed" => assert!(
            matches!(actual, SuppressReason::Delayed { .. }),
            "{actual:?}"
        ),
        "capped" => assert!(
            matches!(actual, SuppressReason::LimitReached { .. }),
            "{actual:?}"
        ),
        other => panic!("unknown suppression reason '{}'", other),
    }
}

#[then(expr = "notifier {string} should have {int} send(s) counted in the current window")]
fn sends_in_window(world: &mut HeraldWorld, method: String, count: u32) {
    let registered = world.registry().get(&method).expect("unknown notifier");
    assert_eq!(registered.limiter().sends_in_window(), count);
}
