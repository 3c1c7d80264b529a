//! Periodic health probe over the oracle account loader.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use vrfguard_types::{HealthUpdate, OracleAccount, ProbeConfig};

use super::AccountRegistry;
use crate::resilience::traits::OracleAccountLoader;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    pub probed: usize,
    pub inactive: Vec<String>,
    pub missing: Vec<String>,
    pub transport_errors: usize,
    pub network_healthy: bool,
}

enum ProbeOutcome {
    Active(Option<u64>),
    Inactive,
    Missing,
    TransportError,
}

pub struct HealthProbe {
    registry: Arc<AccountRegistry>,
    loader: Arc<dyn OracleAccountLoader>,
    config: ProbeConfig,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
}

impl HealthProbe {
    pub fn new(
        registry: Arc<AccountRegistry>,
        loader: Arc<dyn OracleAccountLoader>,
        config: ProbeConfig,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = tokio::sync::watch::channel(false);
        Arc::new(Self { registry, loader, config, shutdown_tx })
    }

    /// Start the background probe loop. `None` when probing is disabled.
    pub fn start(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.enabled {
            return None;
        }
        let probe = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_millis(self.config.interval_ms);

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        let report = probe.probe_once().await;
                        tracing::debug!(
                            probed = report.probed,
                            inactive = report.inactive.len(),
                            missing = report.missing.len(),
                            network_healthy = report.network_healthy,
                            "health probe finished"
                        );
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!("Health probe shutting down");
                        break;
                    }
                }
            }
        }))
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Probe every account once and write the results into the registry.
    pub async fn probe_once(&self) -> ProbeReport {
        let accounts = self.registry.accounts().to_vec();
        let outcomes = join_all(accounts.iter().map(|a| self.probe_account(a))).await;

        let mut report = ProbeReport { probed: accounts.len(), ..ProbeReport::default() };
        for (account, outcome) in accounts.iter().zip(outcomes) {
            let current = self.registry.health(&account.name).map_or(1.0, |h| h.success_rate);
            match outcome {
                ProbeOutcome::Active(Some(depth)) => {
                    self.registry.update_health(&account.name, HealthUpdate::queue_depth(depth));
                },
                ProbeOutcome::Active(None) => {},
                ProbeOutcome::Inactive => {
                    self.registry
                        .update_health(&account.name, HealthUpdate::success_rate(current * 0.5));
                    report.inactive.push(account.name.clone());
                },
                ProbeOutcome::Missing => {
                    self.registry.update_health(&account.name, HealthUpdate::success_rate(0.0));
                    report.missing.push(account.name.clone());
                },
                ProbeOutcome::TransportError => report.transport_errors += 1,
            }
        }

        report.network_healthy = report.transport_errors == 0;
        self.registry.classifier().report_network_health(report.network_healthy);
        report
    }

    async fn probe_account(&self, account: &OracleAccount) -> ProbeOutcome {
        let info = match self.loader.load(&account.identity).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                tracing::warn!(account = %account.name, "oracle account not found");
                return ProbeOutcome::Missing;
            },
            Err(e) => {
                tracing::debug!(account = %account.name, "probe failed: {}", e);
                return ProbeOutcome::TransportError;
            },
        };

        if !info.is_active {
            tracing::warn!(account = %account.name, status = %info.status, "oracle account inactive");
            return ProbeOutcome::Inactive;
        }

        match self.loader.load_queue(&info.queue).await {
            Ok(snapshot) => ProbeOutcome::Active(snapshot.map(|s| s.size)),
            Err(e) => {
                tracing::debug!(account = %account.name, queue = %info.queue, "queue probe failed: {}", e);
                ProbeOutcome::TransportError
            },
        }
    }
}
