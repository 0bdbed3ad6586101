//! Periodic lifecycle sweep across all owners.

use std::time::Duration;

use tokio::{sync::watch, task::JoinHandle};

use crate::{services::lifecycle_service, state::AppState};

/// Spawn the sweep loop; `SWEEP_INTERVAL_SECS=0` leaves it off.
pub fn spawn(state: AppState, mut shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
    let interval_secs = state.config.sweep_interval_secs;
    if interval_secs == 0 {
        tracing::info!("lifecycle sweeper disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        tracing::info!(interval_secs, "lifecycle sweeper started");
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = lifecycle_service::sweep_all(&state).await;
                    if outcome.expired + outcome.completed > 0 {
                        tracing::info!(
                            expired = outcome.expired,
                            completed = outcome.completed,
                            "lifecycle sweep applied"
                        );
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("lifecycle sweeper stopped");
    }))
}
