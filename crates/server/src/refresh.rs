//! Background refresh
//!
//! One task per configured role ticks at the role's refresh interval and runs
//! the refresh cycle on the blocking pool, so request handlers never wait on
//! file I/O.

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::state::{AppState, Role};

/// Start a refresh task for every configured role.
///
/// Returns a shutdown sender; sending `true` stops all tasks.
pub fn start_refresh_tasks(state: &AppState) -> watch::Sender<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    for role in state.roles() {
        spawn_refresh_task(state.clone(), role, shutdown_rx.clone());
    }

    shutdown_tx
}

fn spawn_refresh_task(state: AppState, role: Role, mut shutdown_rx: watch::Receiver<bool>) {
    let Some(period) = state.refresh_interval(role) else {
        return;
    };

    tokio::spawn(async move {
        // The initial load already ran; the first refresh is one period away
        let mut interval_timer = tokio::time::interval_at(Instant::now() + period, period);
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(role = role.as_str(), period_secs = period.as_secs(), "Refresh task started");

        loop {
            tokio::select! {
                _ = interval_timer.tick() => {
                    let worker = state.clone();
                    match tokio::task::spawn_blocking(move || worker.refresh_role(role)).await {
                        Ok(Some(refresh)) if !refresh.failed.is_empty() => {
                            tracing::warn!(
                                role = role.as_str(),
                                failed = ?refresh.failed,
                                "Some sources could not be refreshed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(role = role.as_str(), error = %e, "Refresh cycle panicked");
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!(role = role.as_str(), "Refresh task shutting down");
                        break;
                    }
                }
            }
        }
    });
}
