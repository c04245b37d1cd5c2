//! Periodic sync trigger

use chrono::Utc;
use ingest::{Ingester, SyncStats};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Run one sync on the blocking pool and wait for pending alerts
///
/// Errors are logged; the driver has already alerted about them.
pub async fn run_once(ingester: Arc<Ingester>) -> Option<SyncStats> {
    let result = tokio::task::spawn_blocking(move || {
        let result = ingester.run(Utc::now());
        ingester.alerter().flush();
        result
    })
    .await;

    match result {
        Ok(Ok(stats)) => {
            info!(
                "Sync complete: {} fetched, {} incoming, {} outgoing, {} skipped, {} malformed, {} pending in {}ms",
                stats.entries_fetched,
                stats.incoming_stored,
                stats.outgoing_stored,
                stats.skipped,
                stats.malformed,
                stats.pending,
                stats.duration_ms
            );
            Some(stats)
        }
        Ok(Err(e)) => {
            error!("Sync failed: {}", e);
            None
        }
        Err(e) => {
            error!("Sync task panicked: {}", e);
            None
        }
    }
}

/// Trigger a sync every `period`, starting immediately
///
/// Each run is awaited before the next tick, so runs never overlap; ticks
/// missed while a run was in progress are dropped.
pub async fn run_forever(ingester: Arc<Ingester>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Scheduling sync every {}s", period.as_secs());
    loop {
        interval.tick().await;
        run_once(ingester.clone()).await;
    }
}
