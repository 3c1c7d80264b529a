use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use vrfguard_core::resilience::metrics;
use vrfguard_core::resilience::{QueuePositionEstimator, TrackerStats};
use vrfguard_core::sim::{SimulatedOracle, SimulationProfile};
use vrfguard_core::{
    AccountRegistry, EmergencyResolver, ErrorClassifier, HealthProbe, LeaderElector, LocalPeerBus,
    PeerTransport, RetryOrchestrator, RoundCoordinator, RoundRequest, StatusTracker,
};
use vrfguard_types::{CoinSide, OracleAccount, RoundPhase, RoundStatus};

use crate::cli::SimulateArgs;
use crate::config_commands;

#[derive(Serialize)]
struct SimulationSummary {
    wall_time_ms: u64,
    rounds: Vec<RoundStatus>,
    stats: TrackerStats,
}

pub async fn run(path: &Path, args: SimulateArgs) -> Result<()> {
    let mut config = config_commands::load(path)?;
    if let Some(timeout_ms) = args.emergency_timeout_ms {
        config.emergency.timeout_ms = timeout_ms;
    }
    if let Err(e) = config.check_budget() {
        tracing::warn!("{}", e);
    }
    if args.metrics {
        metrics::init_metrics()?;
    }

    if config.accounts.is_empty() {
        config.accounts = config_commands::sample_accounts();
    }
    let accounts: Vec<OracleAccount> = config.oracle_accounts();
    let offline = args
        .offline_accounts
        .iter()
        .map(|name| {
            accounts
                .iter()
                .find(|a| &a.name == name)
                .map(|a| a.identity.as_str().to_string())
                .with_context(|| format!("unknown account: {name}"))
        })
        .collect::<Result<HashSet<String>>>()?;

    let oracle = Arc::new(SimulatedOracle::new(SimulationProfile {
        failure_rate: args.failure_rate,
        latency: Duration::from_millis(args.latency_ms),
        offline,
        seed: args.seed,
        ..SimulationProfile::default()
    }));

    let registry = Arc::new(AccountRegistry::new(
        accounts,
        config.health,
        Arc::new(ErrorClassifier::new()),
    ));
    let transport: Arc<dyn PeerTransport> = Arc::new(LocalPeerBus::default());
    let node_id = uuid::Uuid::new_v4().to_string();
    let elector =
        LeaderElector::with_node_id(node_id.clone(), config.leader.clone(), Arc::clone(&transport));
    let tracker = Arc::new(
        StatusTracker::new(config.status.clone())
            .with_registry(Arc::clone(&registry))
            .with_peer_transport(node_id, transport),
    );
    let election = elector.start();
    let _leadership = tracker.follow_leadership(&elector);

    let probe = HealthProbe::new(Arc::clone(&registry), oracle.clone(), config.probe.clone());
    let _probe_task = probe.start();

    let orchestrator =
        Arc::new(RetryOrchestrator::new(Arc::clone(&registry), oracle.clone(), config.retry.clone()));
    let emergency =
        EmergencyResolver::new(oracle.clone(), Arc::clone(&tracker), config.emergency.clone());
    let estimator = Arc::new(QueuePositionEstimator::new(oracle.clone(), config.queue.clone()));
    let coordinator = Arc::new(
        RoundCoordinator::new(orchestrator, emergency, Arc::clone(&tracker))
            .with_estimator(estimator),
    );

    println!(
        "{} {} rounds, failure rate {:.0}%, latency {}ms, emergency window {}ms",
        "Simulating".cyan().bold(),
        args.rounds,
        args.failure_rate * 100.0,
        args.latency_ms,
        config.emergency.timeout_ms
    );

    let mut statuses = tracker.subscribe();
    let started = Instant::now();
    for i in 0..args.rounds {
        let choice = if i % 2 == 0 { CoinSide::Heads } else { CoinSide::Tails };
        coordinator.start_round(RoundRequest::new(
            format!("round-{i:04}"),
            format!("room-{i:04}"),
            choice,
        ))?;
    }

    let expected = args.rounds as usize;
    let mut finished: BTreeMap<String, RoundStatus> = BTreeMap::new();
    let deadline = Duration::from_millis(config.emergency.timeout_ms.saturating_add(10_000));
    let collect = async {
        while finished.len() < expected {
            match statuses.recv().await {
                Some(status) if status.status.is_terminal() => {
                    finished.insert(status.round_id.clone(), status);
                },
                Some(_) => {},
                None => break,
            }
        }
    };
    if tokio::time::timeout(deadline, collect).await.is_err() {
        tracing::warn!("simulation deadline reached before every round finished");
    }
    let wall_time = started.elapsed();

    coordinator.shutdown();
    probe.shutdown();
    elector.shutdown();
    if let Err(e) = election.await {
        tracing::debug!("election task ended abnormally: {}", e);
    }

    let summary = SimulationSummary {
        wall_time_ms: wall_time.as_millis() as u64,
        rounds: finished.into_values().collect(),
        stats: tracker.stats(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, expected);
    }

    if args.metrics {
        if let Some(text) = metrics::render() {
            println!("\n{}\n{text}", "Metrics:".cyan().bold());
        }
    }
    Ok(())
}

fn print_summary(summary: &SimulationSummary, expected: usize) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Round", "Status", "Resolution", "Attempts", "Account", "Outcome", "Elapsed (ms)", "Error",
    ]);

    for round in &summary.rounds {
        let status = match round.status {
            RoundPhase::Completed => Cell::new("completed").fg(Color::Green),
            RoundPhase::Failed => Cell::new("failed").fg(Color::Red),
            other => Cell::new(other.to_string()).fg(Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(&round.round_id),
            status,
            Cell::new(round.resolution.map_or_else(|| "-".to_string(), |m| m.to_string())),
            Cell::new(round.attempt),
            Cell::new(round.account.as_deref().unwrap_or("-")),
            Cell::new(round.outcome.map_or_else(|| "-".to_string(), |o| o.to_string())),
            Cell::new(round.time_elapsed_ms),
            Cell::new(round.error.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");

    let stats = &summary.stats;
    let unfinished = expected.saturating_sub(summary.rounds.len());
    println!(
        "\n{} {} completed, {} failed, {} unfinished in {}ms",
        "Summary:".cyan().bold(),
        stats.completed_rounds,
        stats.failed_rounds,
        unfinished,
        summary.wall_time_ms
    );
    println!(
        "  success rate {:.1}%, avg processing {:.0}ms, {}/{} accounts healthy, load {}",
        stats.success_rate * 100.0,
        stats.average_processing_ms,
        stats.healthy_accounts,
        stats.total_accounts,
        stats.load
    );
    if unfinished > 0 {
        println!("{}", format!("{unfinished} rounds did not finish").red());
    }
}
