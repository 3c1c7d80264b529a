use super::*;
use crate::sim::{SimulatedOracle, SimulationProfile};
use crate::resilience::traits::OracleAccountLoader;
use chrono::Utc;

fn registry_with(names: &[(&str, i32)]) -> AccountRegistry {
    let accounts = names
        .iter()
        .map(|(name, priority)| OracleAccount::new(format!("key-{name}"), *name, *priority))
        .collect();
    AccountRegistry::new(accounts, HealthThresholds::default(), Arc::new(ErrorClassifier::new()))
}

fn abc() -> AccountRegistry {
    registry_with(&[("a", 1), ("b", 2), ("c", 3)])
}

#[test]
fn test_round_robin_cycles_in_registration_order() {
    let registry = abc();
    let picks: Vec<i32> = (0..4)
        .map(|_| registry.select_account(SelectionStrategy::RoundRobin).unwrap().priority)
        .collect();
    assert_eq!(picks, vec![1, 2, 3, 1]);
}

#[test]
fn test_health_based_prefers_lowest_score() {
    let registry = abc();
    // a: 0.4 × 1250/5000 = 0.1
    registry.update_health("a", HealthUpdate::response_time(1250.0));
    // b: unhealthy
    registry.update_health("b", HealthUpdate::success_rate(0.2));
    // c: 0.4 × 3750/5000 = 0.3
    registry.update_health("c", HealthUpdate::response_time(3750.0));

    assert!(!registry.health("b").unwrap().is_healthy);
    for _ in 0..5 {
        assert_eq!(registry.select_account(SelectionStrategy::HealthBased).unwrap().name, "a");
    }
}

#[test]
fn test_health_based_ties_break_on_priority() {
    let registry = registry_with(&[("slow", 5), ("fast", 1)]);
    assert_eq!(registry.select_account(SelectionStrategy::HealthBased).unwrap().name, "fast");
}

#[test]
fn test_health_based_falls_back_when_none_healthy() {
    let registry = abc();
    for name in ["a", "b", "c"] {
        registry.update_health(name, HealthUpdate::success_rate(0.1));
    }
    assert_eq!(registry.healthy_count(), 0);
    let picked = registry.select_account(SelectionStrategy::HealthBased).unwrap();
    assert_eq!(picked.name, "a");
}

#[tokio::test(start_paused = true)]
async fn test_quarantine_after_three_failures() {
    let registry = abc();
    let error = OracleFailure::other("connection reset by peer");

    registry.handle_failure("a", &error);
    registry.handle_failure("a", &error);
    assert!(!registry.is_quarantined("a"));
    let third = registry.handle_failure("a", &error);
    assert!(third.is_critical());
    assert!(registry.is_quarantined("a"));

    for _ in 0..6 {
        assert_ne!(registry.select_account(SelectionStrategy::RoundRobin).unwrap().name, "a");
    }
    assert_ne!(registry.select_account(SelectionStrategy::HealthBased).unwrap().name, "a");
    assert_ne!(registry.get_backup_account(&HashSet::new()).unwrap().name, "a");

    // network wait 3000ms → quarantine 30s, clamped up to 60s
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(!registry.is_quarantined("a"));
}

#[tokio::test(start_paused = true)]
async fn test_critical_failure_quarantines_immediately() {
    let registry = abc();
    let c = registry.handle_failure("b", &OracleFailure::OracleOffline { reason: "paused".into() });
    assert!(c.is_critical());
    assert!(registry.is_quarantined("b"));
    assert_eq!(registry.health("b").unwrap().success_rate, 0.5);
}

#[tokio::test(start_paused = true)]
async fn test_all_quarantined_is_an_error() {
    let registry = abc();
    for name in ["a", "b", "c"] {
        registry.handle_failure(name, &OracleFailure::AccountInvalid { reason: "closed".into() });
    }
    assert!(matches!(
        registry.select_account(SelectionStrategy::RoundRobin),
        Err(AppError::NoSelectableAccount(_))
    ));
    assert!(matches!(
        registry.select_account(SelectionStrategy::HealthBased),
        Err(AppError::NoSelectableAccount(_))
    ));
    assert!(registry.get_backup_account(&HashSet::new()).is_none());
}

#[test]
fn test_failure_degradation_by_type() {
    let registry = abc();
    registry.update_health("a", HealthUpdate::response_time(1000.0));
    registry.handle_failure("a", &OracleFailure::Timeout { elapsed_ms: 10_000 });
    assert_eq!(registry.health("a").unwrap().avg_response_time_ms, 3500.0);

    registry.update_health("b", HealthUpdate::queue_depth(10));
    registry.handle_failure("b", &OracleFailure::QueueFull { queue_depth: None, retry_after_ms: None });
    assert_eq!(registry.health("b").unwrap().queue_depth, 25);

    registry.handle_failure("c", &OracleFailure::other("something odd"));
    assert!((registry.health("c").unwrap().success_rate - 0.9).abs() < 1e-9);
}

#[test]
fn test_account_invalid_forces_unhealthy() {
    let registry = AccountRegistry::new(
        vec![OracleAccount::new("k", "solo", 1)],
        HealthThresholds { min_success_rate: 0.0, ..HealthThresholds::default() },
        Arc::new(ErrorClassifier::new()),
    );
    registry.handle_failure("solo", &OracleFailure::AccountInvalid { reason: "owner".into() });
    let health = registry.health("solo").unwrap();
    assert_eq!(health.success_rate, 0.0);
    assert!(!health.is_healthy);
}

#[test]
fn test_user_abort_does_not_penalise_account() {
    let registry = abc();
    for _ in 0..3 {
        let c = registry.handle_failure("a", &OracleFailure::UserRejected);
        assert!(c.should_abort());
    }
    assert!(!registry.is_quarantined("a"));
    assert_eq!(registry.classifier().failure_count("a"), 0);
    assert_eq!(registry.health("a").unwrap().success_rate, 1.0);
}

#[test]
fn test_textual_user_abort_does_not_penalise_account() {
    let registry = abc();
    for message in ["User rejected the request", "unauthorized", "Insufficient lamports"] {
        let c = registry.handle_failure("a", &OracleFailure::other(message));
        assert!(c.should_abort(), "{message}");
    }
    assert!(!registry.is_quarantined("a"));
    assert_eq!(registry.classifier().failure_count("a"), 0);
    assert_eq!(registry.health("a").unwrap().success_rate, 1.0);
}

#[test]
fn test_backup_account_ranking() {
    let registry = abc();
    registry.update_health("a", HealthUpdate::success_rate(0.8));
    registry.update_health("b", HealthUpdate::response_time(900.0));
    registry.update_health("c", HealthUpdate::response_time(300.0));

    // b and c tie on success rate; c answers faster
    assert_eq!(registry.get_backup_account(&HashSet::new()).unwrap().name, "c");

    let exclude: HashSet<String> = ["c".to_string()].into();
    assert_eq!(registry.get_backup_account(&exclude).unwrap().name, "b");

    let exclude: HashSet<String> = ["b".to_string(), "c".to_string()].into();
    assert_eq!(registry.get_backup_account(&exclude).unwrap().name, "a");

    let exclude: HashSet<String> = ["a".to_string(), "b".to_string(), "c".to_string()].into();
    assert!(registry.get_backup_account(&exclude).is_none());
}

#[test]
fn test_requires_emergency_fallback_when_all_degraded() {
    let registry = abc();
    assert!(!registry.requires_emergency_fallback());
    for name in ["a", "b", "c"] {
        registry.update_health(name, HealthUpdate::success_rate(0.3));
    }
    assert!(registry.requires_emergency_fallback());
}

#[tokio::test(start_paused = true)]
async fn test_emergency_fallback_counts_quarantine() {
    let registry = registry_with(&[("a", 1), ("b", 2)]);
    assert!(!registry.requires_emergency_fallback());
    registry.quarantine("a", Duration::from_secs(60), "manual");
    assert!(registry.requires_emergency_fallback());
}

#[tokio::test(start_paused = true)]
async fn test_success_clears_failures_and_improves_health() {
    let registry = abc();
    let error = OracleFailure::other("socket hang up");
    registry.handle_failure("a", &error);
    registry.handle_failure("a", &error);
    let degraded = registry.health("a").unwrap().success_rate;

    registry.record_success("a", Duration::from_millis(400));
    let health = registry.health("a").unwrap();
    assert!(health.success_rate > degraded);
    assert_eq!(health.avg_response_time_ms, 400.0);
    assert_eq!(registry.classifier().failure_count("a"), 0);

    // next failure starts from a clean count
    let c = registry.handle_failure("a", &error);
    assert!(!c.is_critical());
    assert!(!registry.is_quarantined("a"));
}

#[test]
fn test_merge_remote_health_last_write_wins() {
    let registry = abc();
    let local = registry.health("a").unwrap();

    let stale = AccountHealth {
        success_rate: 0.1,
        last_updated: local.last_updated - chrono::Duration::seconds(5),
        ..local.clone()
    };
    assert!(!registry.merge_remote_health("a", &stale));

    let tie = AccountHealth { success_rate: 0.1, ..local.clone() };
    assert!(!registry.merge_remote_health("a", &tie));

    let newer = AccountHealth {
        success_rate: 0.1,
        is_healthy: true,
        last_updated: Utc::now() + chrono::Duration::seconds(5),
        ..local
    };
    assert!(registry.merge_remote_health("a", &newer));
    let merged = registry.health("a").unwrap();
    assert_eq!(merged.success_rate, 0.1);
    assert!(!merged.is_healthy);
    assert!(!registry.merge_remote_health("zzz", &newer));
}

#[test]
fn test_merge_remote_health_clamps_values() {
    let registry = abc();
    let local = registry.health("a").unwrap();
    let remote = AccountHealth {
        is_healthy: false,
        queue_depth: 3,
        avg_response_time_ms: -250.0,
        success_rate: 7.5,
        last_updated: Utc::now() + chrono::Duration::seconds(5),
    };
    assert!(registry.merge_remote_health("a", &remote));
    let merged = registry.health("a").unwrap();
    assert_eq!(merged.success_rate, 1.0);
    assert_eq!(merged.avg_response_time_ms, 0.0);
    assert_eq!(merged.queue_depth, 3);
    assert!(merged.is_healthy);
    assert_eq!(merged.last_updated, remote.last_updated);

    let garbage = AccountHealth {
        success_rate: f64::NAN,
        avg_response_time_ms: f64::INFINITY,
        last_updated: remote.last_updated + chrono::Duration::seconds(1),
        ..local
    };
    assert!(registry.merge_remote_health("a", &garbage));
    let merged = registry.health("a").unwrap();
    assert_eq!(merged.success_rate, 1.0);
    assert_eq!(merged.avg_response_time_ms, 0.0);
    assert_eq!(merged.queue_depth, 0);
}

#[test]
fn test_duplicate_names_ignored() {
    let registry = registry_with(&[("a", 1), ("a", 2)]);
    assert_eq!(registry.accounts().len(), 1);
    assert_eq!(registry.account("a").unwrap().priority, 1);
}

#[tokio::test]
async fn test_probe_updates_queue_depth_and_flags() {
    let mut profile = SimulationProfile::default();
    profile.offline.insert("key-b".to_string());
    let oracle = Arc::new(SimulatedOracle::new(profile));
    oracle.set_queue_size(&SimulatedOracle::queue_for("key-a"), 12);
    oracle.set_missing("key-c");

    let registry = Arc::new(abc());
    let loader: Arc<dyn OracleAccountLoader> = oracle.clone();
    let probe = HealthProbe::new(Arc::clone(&registry), loader, Default::default());
    let report = probe.probe_once().await;

    assert_eq!(report.probed, 3);
    assert_eq!(report.inactive, vec!["b".to_string()]);
    assert_eq!(report.missing, vec!["c".to_string()]);
    assert!(report.network_healthy);
    assert_eq!(registry.health("a").unwrap().queue_depth, 12);
    assert_eq!(registry.health("b").unwrap().success_rate, 0.5);
    assert_eq!(registry.health("c").unwrap().success_rate, 0.0);
}

#[tokio::test]
async fn test_probe_reports_network_health() {
    let oracle = Arc::new(SimulatedOracle::reliable());
    oracle.set_loader_down(true);
    let registry = Arc::new(abc());
    let probe = HealthProbe::new(Arc::clone(&registry), oracle, Default::default());

    let report = probe.probe_once().await;
    assert_eq!(report.transport_errors, 3);
    assert!(!report.network_healthy);
    assert!(registry.classifier().network_unhealthy());
}
