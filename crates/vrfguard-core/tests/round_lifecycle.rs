//! End-to-end round lifecycles against the simulated oracle.

use std::sync::Arc;
use std::time::Duration;
use vrfguard_core::resilience::EmergencyOptions;
use vrfguard_core::sim::{ScriptedOutcome, SimulatedOracle};
use vrfguard_core::{
    AccountRegistry, EmergencyResolver, ErrorClassifier, LeaderElector, LocalPeerBus,
    PeerTransport, RetryOptions, RetryOrchestrator, RoundCoordinator, RoundRequest, StatusTracker,
};
use vrfguard_types::{
    CoinSide, EmergencyConfig, EmergencyEvent, FallbackMethod, HealthThresholds, LeaderConfig,
    OracleAccount, OracleFailure, ResolutionMethod, RetryConfig, RoundPhase, StatusConfig,
};

struct Harness {
    oracle: Arc<SimulatedOracle>,
    registry: Arc<AccountRegistry>,
    tracker: Arc<StatusTracker>,
    coordinator: Arc<RoundCoordinator>,
}

fn accounts(names: &[&str]) -> Vec<OracleAccount> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| OracleAccount::new(format!("key-{name}"), *name, i as i32))
        .collect()
}

fn harness_with(names: &[&str], tracker: StatusTracker) -> Harness {
    let oracle = Arc::new(SimulatedOracle::reliable());
    let registry = Arc::new(AccountRegistry::new(
        accounts(names),
        HealthThresholds::default(),
        Arc::new(ErrorClassifier::new()),
    ));
    let tracker = Arc::new(tracker.with_registry(Arc::clone(&registry)));
    let orchestrator = Arc::new(RetryOrchestrator::new(
        Arc::clone(&registry),
        oracle.clone(),
        RetryConfig::default(),
    ));
    let emergency =
        EmergencyResolver::new(oracle.clone(), Arc::clone(&tracker), EmergencyConfig::default());
    let coordinator =
        Arc::new(RoundCoordinator::new(orchestrator, emergency, Arc::clone(&tracker)));
    Harness { oracle, registry, tracker, coordinator }
}

fn harness(names: &[&str]) -> Harness {
    harness_with(names, StatusTracker::new(StatusConfig::default()))
}

#[tokio::test(start_paused = true)]
async fn test_oracle_path_resolves_round() {
    let h = harness(&["a", "b", "c"]);
    let mut statuses = h.tracker.subscribe();
    h.coordinator.start_round(RoundRequest::new("r1", "room-1", CoinSide::Heads)).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let round = h.tracker.get("r1").unwrap();
    assert_eq!(round.status, RoundPhase::Completed);
    assert_eq!(round.resolution, Some(ResolutionMethod::Oracle));
    assert_eq!(h.oracle.submission_count("resolve_round"), 0);
    assert!(!h.coordinator.emergency().is_monitoring("r1"));

    let phases: Vec<RoundPhase> = statuses.drain().into_iter().map(|s| s.status).collect();
    assert_eq!(phases, vec![RoundPhase::Pending, RoundPhase::Processing, RoundPhase::Completed]);

    // The watchdog window passing later changes nothing.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.oracle.submission_count("resolve_round"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rotation_recovers_from_failing_account() {
    let h = harness(&["a", "b", "c"]);
    h.oracle.push_script([
        ScriptedOutcome::Fail(OracleFailure::OracleOffline { reason: "queue paused".into() }),
        ScriptedOutcome::Succeed,
    ]);
    h.coordinator.start_round(RoundRequest::new("r1", "room-1", CoinSide::Tails)).unwrap();

    tokio::time::sleep(Duration::from_secs(40)).await;
    // Terminal rounds leave the active view after the grace period; history stays.
    let round = h.tracker.history("r1").pop().unwrap();
    assert_eq!(round.status, RoundPhase::Completed);
    assert_eq!(round.resolution, Some(ResolutionMethod::Oracle));
    assert_eq!(round.attempt, 2);
    assert_eq!(round.account.as_deref(), Some("b"));
    assert!(h.registry.health("a").unwrap().success_rate < 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_hung_oracle_falls_back_at_emergency_window() {
    let h = harness(&["a", "b", "c"]);
    h.oracle.push_script([ScriptedOutcome::Hang, ScriptedOutcome::Hang, ScriptedOutcome::Hang]);
    let mut events = h.coordinator.emergency().subscribe();
    h.coordinator.start_round(RoundRequest::new("r1", "room-1", CoinSide::Tails)).unwrap();

    // 3 × 10 s timeouts plus backoff fit inside the 60 s window.
    tokio::time::sleep(Duration::from_secs(45)).await;
    let round = h.tracker.get("r1").unwrap();
    assert_eq!(round.status, RoundPhase::Retrying);
    assert!(round.error.is_some());
    assert!(h.coordinator.emergency().is_monitoring("r1"));

    tokio::time::sleep(Duration::from_secs(16)).await;
    let round = h.tracker.get("r1").unwrap();
    assert_eq!(round.status, RoundPhase::Completed);
    assert_eq!(round.resolution, Some(ResolutionMethod::Emergency));
    assert_eq!(round.outcome, Some(CoinSide::Tails));

    let terminal = events.drain().into_iter().filter(EmergencyEvent::is_terminal).count();
    assert_eq!(terminal, 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_usable_account_resolves_immediately() {
    let h = harness(&["a"]);
    h.oracle.push_script([ScriptedOutcome::Fail(OracleFailure::AccountInvalid {
        reason: "owner mismatch".into(),
    })]);
    let mut request = RoundRequest::new("r1", "room-1", CoinSide::Heads);
    request.emergency = EmergencyOptions {
        fallback_method: Some(FallbackMethod::Deterministic),
        ..EmergencyOptions::default()
    };
    h.coordinator.start_round(request).unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    let round = h.tracker.get("r1").unwrap();
    assert_eq!(round.status, RoundPhase::Completed);
    assert_eq!(round.resolution, Some(ResolutionMethod::Emergency));
    assert!(round.outcome.is_some());
    assert!(h.registry.is_quarantined("a"));
    assert_eq!(h.oracle.submission_count("resolve_round"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_settlement_refunds() {
    let h = harness(&["a", "b"]);
    h.oracle.set_fail_settlements(true);
    h.oracle.push_script([ScriptedOutcome::Hang]);
    let mut request = RoundRequest::new("r1", "room-1", CoinSide::Heads);
    request.retry = RetryOptions { max_retries: Some(1), ..RetryOptions::default() };
    request.emergency = EmergencyOptions { timeout_ms: Some(20_000), ..EmergencyOptions::default() };
    h.coordinator.start_round(request).unwrap();

    tokio::time::sleep(Duration::from_secs(21)).await;
    let round = h.tracker.get("r1").unwrap();
    assert_eq!(round.status, RoundPhase::Completed);
    assert_eq!(round.outcome, None);
    assert_eq!(h.oracle.submission_count("refund"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_many_rounds_all_conclude() {
    let h = harness(&["a", "b", "c"]);
    h.oracle.push_script([
        ScriptedOutcome::Hang,
        ScriptedOutcome::Fail(OracleFailure::QueueFull { queue_depth: Some(100), retry_after_ms: None }),
        ScriptedOutcome::RejectOnChain("custom program error: 0x1770".into()),
    ]);
    for i in 0..10 {
        let choice = if i % 2 == 0 { CoinSide::Heads } else { CoinSide::Tails };
        h.coordinator
            .start_round(RoundRequest::new(format!("r{i}"), format!("room-{i}"), choice))
            .unwrap();
    }

    tokio::time::sleep(Duration::from_secs(30)).await;
    for i in 0..10 {
        let round = h.tracker.history(&format!("r{i}")).pop().unwrap();
        assert!(round.status.is_terminal(), "round r{i} still {}", round.status);
        assert!(h.coordinator.emergency().is_settled(&format!("r{i}")));
    }
    let stats = h.tracker.stats();
    assert_eq!(stats.active_rounds, 0);
    assert_eq!(stats.completed_rounds, 10);
}

#[tokio::test(start_paused = true)]
async fn test_follower_mirrors_leader_status() {
    let bus = Arc::new(LocalPeerBus::default());
    let transport: Arc<dyn PeerTransport> = bus.clone();

    let leader_node = LeaderElector::with_node_id("node-a", LeaderConfig::default(), Arc::clone(&transport));
    let follower_node = LeaderElector::with_node_id("node-b", LeaderConfig::default(), Arc::clone(&transport));
    let elections = [leader_node.start(), follower_node.start()];

    let h = harness_with(
        &["a", "b"],
        StatusTracker::new(StatusConfig::default())
            .with_peer_transport("node-a", Arc::clone(&transport)),
    );
    let follower = Arc::new(
        StatusTracker::new(StatusConfig::default())
            .with_peer_transport("node-b", Arc::clone(&transport)),
    );
    let _follow_a = h.tracker.follow_leadership(&leader_node);
    let _follow_b = follower.follow_leadership(&follower_node);
    let _sync = follower.start_peer_sync();

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(h.tracker.is_leader());
    assert!(!follower.is_leader());

    h.coordinator.start_round(RoundRequest::new("r1", "room-1", CoinSide::Heads)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mirrored = follower.get("r1").unwrap();
    assert_eq!(mirrored.status, RoundPhase::Completed);
    assert_eq!(mirrored.resolution, Some(ResolutionMethod::Oracle));

    leader_node.shutdown();
    follower_node.shutdown();
    for election in elections {
        election.await.unwrap();
    }
}
