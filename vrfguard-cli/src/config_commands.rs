use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use vrfguard_core::modules::config as core_config;
use vrfguard_types::{OracleAccountConfig, ResilienceConfig};

/// Accounts used when the config names none.
pub fn sample_accounts() -> Vec<OracleAccountConfig> {
    (1..=3)
        .map(|i| OracleAccountConfig {
            identity: format!("oracle-key-{i}"),
            name: format!("oracle-{i}"),
            priority: i,
        })
        .collect()
}

pub fn load(path: &Path) -> Result<ResilienceConfig> {
    core_config::load_config(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

pub fn show_config(path: &Path, json: bool) -> Result<()> {
    let config = load(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let source = if path.exists() { path.display().to_string() } else { "defaults".to_string() };
    println!("{} ({})", "Resilience Configuration:".cyan().bold(), source);
    println!("  Retry:");
    println!("    Timeout: {}ms", config.retry.timeout_ms);
    println!("    Attempts: {}", config.retry.max_retries);
    println!("    Backoff: {}ms..{}ms", config.retry.base_delay_ms, config.retry.max_delay_ms);
    println!("    Rotate on failure: {}", config.retry.rotate_accounts_on_failure);
    println!("    Strategy: {:?}", config.retry.selection_strategy);
    println!("  Emergency:");
    println!("    Window: {}ms", config.emergency.timeout_ms);
    println!("    Fallback: {}", config.emergency.fallback_method);
    println!("    Manual retry: {}", config.emergency.enable_manual_retry);
    println!("    Settlement timeout: {}ms", config.emergency.settlement_timeout_ms);
    println!("  Worst-case retry budget: {}ms", config.retry_budget_ms());
    println!("  Accounts: {}", config.accounts.len());
    for account in &config.accounts {
        println!("    {} ({}) priority {}", account.name, account.identity, account.priority);
    }
    Ok(())
}

pub fn validate_config(path: &Path) -> Result<()> {
    let config = load(path)?;
    config.check_budget()?;
    if config.accounts.is_empty() {
        println!("{} no oracle accounts configured", "!".yellow());
    }
    println!(
        "{} Config valid: emergency window {}ms > retry budget {}ms",
        "✓".green(),
        config.emergency.timeout_ms,
        config.retry_budget_ms()
    );
    Ok(())
}

pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = ResilienceConfig { accounts: sample_accounts(), ..ResilienceConfig::default() };
    core_config::save_config(path, &config)?;
    println!("{} Wrote default config to {}", "✓".green(), path.display());
    Ok(())
}
