use super::*;
use crate::resilience::classifier::ErrorClassifier;
use crate::sim::{ScriptedOutcome, SimulatedOracle};
use vrfguard_types::{HealthThresholds, HealthUpdate};

fn setup(names: &[&str]) -> (Arc<SimulatedOracle>, RetryOrchestrator) {
    let accounts = names
        .iter()
        .enumerate()
        .map(|(i, name)| OracleAccount::new(format!("key-{name}"), *name, i as i32 + 1))
        .collect();
    let registry = Arc::new(AccountRegistry::new(
        accounts,
        HealthThresholds::default(),
        Arc::new(ErrorClassifier::new()),
    ));
    let oracle = Arc::new(SimulatedOracle::reliable());
    let orchestrator = RetryOrchestrator::new(registry, oracle.clone(), RetryConfig::default());
    (oracle, orchestrator)
}

fn recorder() -> (StatusCallback, Arc<Mutex<Vec<StatusUpdate>>>) {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    let callback: StatusCallback = Arc::new(move |update| sink.lock().push(update));
    (callback, updates)
}

fn fail(text: &str) -> ScriptedOutcome {
    ScriptedOutcome::Fail(OracleFailure::other(text))
}

#[tokio::test(start_paused = true)]
async fn test_first_attempt_success() {
    let (oracle, orchestrator) = setup(&["a", "b", "c"]);
    let (callback, updates) = recorder();

    let report = orchestrator
        .request_randomness("r1", "room-1", &RetryOptions::default(), Some(callback))
        .await;

    assert!(report.is_success());
    assert_eq!(report.attempts, 1);
    assert_eq!(report.accounts_used, vec!["a".to_string()]);
    assert_eq!(oracle.anchors_issued(), 1);

    let phases: Vec<RoundPhase> = updates.lock().iter().map(|u| u.status).collect();
    assert_eq!(phases, vec![RoundPhase::Processing, RoundPhase::Completed]);
    assert_eq!(updates.lock()[1].success, Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_rotates_accounts_and_refreshes_anchor() {
    let (oracle, orchestrator) = setup(&["a", "b", "c"]);
    oracle.push_script([
        fail("socket hang up"),
        ScriptedOutcome::Fail(OracleFailure::QueueFull { queue_depth: None, retry_after_ms: None }),
        ScriptedOutcome::Succeed,
    ]);
    let (callback, updates) = recorder();

    let report = orchestrator
        .request_randomness("r1", "room-1", &RetryOptions::default(), Some(callback))
        .await;

    assert!(report.is_success());
    assert_eq!(report.attempts, 3);
    assert_eq!(report.accounts_used, vec!["a", "b", "c"]);
    // forced on attempt 1, again after the network error, reused after queue_full
    assert_eq!(oracle.anchors_issued(), 2);

    let updates = updates.lock();
    let attempts: Vec<u32> = updates.iter().map(|u| u.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3, 3]);
    assert_eq!(updates[1].status, RoundPhase::Retrying);
    assert!(updates[1].error.as_deref().is_some_and(|e| e.contains("socket hang up")));
}

#[tokio::test(start_paused = true)]
async fn test_exhausts_retries() {
    let (oracle, orchestrator) = setup(&["a", "b", "c"]);
    oracle.push_script((0..3).map(|_| ScriptedOutcome::Fail(OracleFailure::Timeout { elapsed_ms: 10 })));
    let (callback, updates) = recorder();

    let report = orchestrator
        .request_randomness("r1", "room-1", &RetryOptions::default(), Some(callback))
        .await;

    assert!(matches!(report.outcome, Err(AppError::RetriesExhausted { attempts: 3, .. })));
    assert_eq!(report.attempts, 3);
    assert_eq!(oracle.submission_count("request_randomness"), 3);
    assert_eq!(updates.lock().last().map(|u| u.status), Some(RoundPhase::Failed));
    assert_eq!(orchestrator.consecutive_failures(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_short_circuits() {
    let (oracle, orchestrator) = setup(&["a", "b"]);
    oracle.push_script([ScriptedOutcome::Fail(OracleFailure::UserRejected), ScriptedOutcome::Succeed]);

    let report =
        orchestrator.request_randomness("r1", "room-1", &RetryOptions::default(), None).await;

    assert!(matches!(report.outcome, Err(AppError::NonRetryable { .. })));
    assert_eq!(report.attempts, 1);
    assert_eq!(oracle.submission_count("request_randomness"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_per_attempt_timeout() {
    let (oracle, orchestrator) = setup(&["a", "b"]);
    oracle.push_script([ScriptedOutcome::Hang, ScriptedOutcome::Succeed]);
    let options = RetryOptions { timeout_ms: Some(1000), ..RetryOptions::default() };

    let report = orchestrator.request_randomness("r1", "room-1", &options, None).await;

    assert!(report.is_success());
    assert_eq!(report.attempts, 2);
    assert_eq!(report.accounts_used, vec!["a", "b"]);
    let a = orchestrator.registry().health("a").unwrap();
    assert!(a.avg_response_time_ms >= 2000.0);
}

#[tokio::test(start_paused = true)]
async fn test_on_chain_error_is_retried() {
    let (oracle, orchestrator) = setup(&["a", "b"]);
    oracle.push_script([
        ScriptedOutcome::RejectOnChain("custom program error: 0x1771".into()),
        ScriptedOutcome::Succeed,
    ]);

    let report =
        orchestrator.request_randomness("r1", "room-1", &RetryOptions::default(), None).await;
    assert!(report.is_success());
    assert_eq!(report.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_aborts_when_all_accounts_failing() {
    let (oracle, orchestrator) = setup(&["a", "b", "c"]);
    for name in ["a", "b", "c"] {
        orchestrator.registry().update_health(name, HealthUpdate::success_rate(0.3));
    }
    assert!(orchestrator.registry().requires_emergency_fallback());
    oracle.push_script((0..10).map(|_| fail("unexpected response")));
    let options = RetryOptions { max_retries: Some(10), ..RetryOptions::default() };

    let report = orchestrator.request_randomness("r1", "room-1", &options, None).await;

    assert!(matches!(
        report.outcome,
        Err(AppError::AllAccountsFailing { consecutive_failures: 4 })
    ));
    assert_eq!(report.attempts, 4);
    assert!(report.outcome.as_ref().is_err_and(AppError::requires_emergency));
}

#[tokio::test(start_paused = true)]
async fn test_success_clears_failure_count() {
    let (oracle, orchestrator) = setup(&["solo"]);
    oracle.push_script([fail("socket hang up"), fail("socket hang up"), ScriptedOutcome::Succeed]);

    let report =
        orchestrator.request_randomness("r1", "room-1", &RetryOptions::default(), None).await;
    assert!(report.is_success());

    let registry = orchestrator.registry();
    assert_eq!(registry.classifier().failure_count("solo"), 0);
    assert_eq!(orchestrator.consecutive_failures(), 0);

    let next = registry.handle_failure("solo", &OracleFailure::other("socket hang up"));
    assert!(!next.is_critical());
}

#[tokio::test(start_paused = true)]
async fn test_no_selectable_account() {
    let (_oracle, orchestrator) = setup(&["a"]);
    orchestrator.registry().quarantine("a", Duration::from_secs(60), "test");

    let report =
        orchestrator.request_randomness("r1", "room-1", &RetryOptions::default(), None).await;
    assert!(matches!(report.outcome, Err(AppError::NoSelectableAccount(_))));
    assert_eq!(report.attempts, 0);
}

#[test]
fn test_options_override_defaults() {
    let defaults = RetryConfig::default();
    let options = RetryOptions {
        max_retries: Some(5),
        selection_strategy: Some(SelectionStrategy::RoundRobin),
        ..RetryOptions::default()
    };
    let resolved = options.resolve(&defaults);
    assert_eq!(resolved.max_retries, 5);
    assert_eq!(resolved.selection_strategy, SelectionStrategy::RoundRobin);
    assert_eq!(resolved.timeout_ms, defaults.timeout_ms);

    let zero = RetryOptions { max_retries: Some(0), ..RetryOptions::default() };
    assert_eq!(zero.resolve(&defaults).max_retries, 1);
}
