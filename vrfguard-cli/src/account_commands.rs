use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use std::path::Path;
use std::sync::Arc;

use vrfguard_core::sim::{SimulatedOracle, SimulationProfile};
use vrfguard_core::{AccountRegistry, ErrorClassifier, HealthProbe};
use vrfguard_types::OracleAccount;

use crate::config_commands;

pub async fn list_accounts(path: &Path, probe: bool, json: bool) -> Result<()> {
    let config = config_commands::load(path)?;
    let configured = if config.accounts.is_empty() {
        tracing::warn!("no oracle accounts configured, showing sample accounts");
        config_commands::sample_accounts()
    } else {
        config.accounts.clone()
    };
    let registry = Arc::new(AccountRegistry::new(
        configured.iter().map(OracleAccount::from).collect(),
        config.health,
        Arc::new(ErrorClassifier::new()),
    ));

    if probe {
        let loader = Arc::new(SimulatedOracle::new(SimulationProfile::default()));
        let report = HealthProbe::new(Arc::clone(&registry), loader, config.probe.clone())
            .probe_once()
            .await;
        if !json {
            println!(
                "{} probed {} accounts ({} inactive, {} missing, {} errors)",
                "Probe:".cyan().bold(),
                report.probed,
                report.inactive.len(),
                report.missing.len(),
                report.transport_errors
            );
        }
    }

    let views = registry.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Name", "Identity", "Priority", "Status", "Success", "Resp (ms)", "Queue", "Score",
    ]);

    for view in &views {
        let status = if view.quarantined {
            let remaining = view.quarantine_remaining_ms.unwrap_or(0) / 1000;
            Cell::new(format!("Quarantined ({remaining}s)")).fg(Color::Red)
        } else if view.health.is_healthy {
            Cell::new("Healthy").fg(Color::Green)
        } else {
            Cell::new("Degraded").fg(Color::Yellow)
        };

        table.add_row(vec![
            Cell::new(&view.account.name),
            Cell::new(view.account.identity.as_str()),
            Cell::new(view.account.priority),
            status,
            Cell::new(format!("{:.0}%", view.health.success_rate * 100.0)),
            Cell::new(format!("{:.0}", view.health.avg_response_time_ms)),
            Cell::new(view.health.queue_depth),
            Cell::new(format!("{:.3}", view.score)),
        ]);
    }

    println!("{table}");
    println!("\n{} accounts total, {} healthy", views.len(), registry.healthy_count());
    Ok(())
}
