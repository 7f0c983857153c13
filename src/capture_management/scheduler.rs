use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::configuration::ConnectionsConfig;

use super::supervisor::CaptureSupervisor;

/// Runs reconciliation passes until `cancel` fires: once right away, then
/// every `interval`, and after every saved configuration change.
///
/// The timer reloads the configuration itself, so a pass skipped because
/// the file was unreadable is simply retried on the next tick.
pub fn spawn_scheduler(
    supervisor: Arc<CaptureSupervisor>,
    config: Arc<ConnectionsConfig>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut changes = config.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Capture scheduler started, syncing every {:?}", interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Capture scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => reconcile_from_file(&supervisor, &config),
                change = changes.recv() => match change {
                    Ok(desired) => {
                        supervisor.reconcile(&desired);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} configuration change(s), reloading", skipped);
                        reconcile_from_file(&supervisor, &config);
                    }
                    Err(RecvError::Closed) => {
                        warn!("Configuration change channel closed");
                        break;
                    }
                },
            }
        }
    })
}

fn reconcile_from_file(supervisor: &CaptureSupervisor, config: &ConnectionsConfig) {
    match config.list() {
        Ok(desired) => {
            supervisor.reconcile(&desired);
        }
        Err(e) => warn!("Skipping reconciliation, configuration unreadable: {}", e),
    }
}
