//! Background purge of long-expired pairing codes and voice sessions.
//!
//! Hygiene only. Expiry is enforced lazily at every read, so correctness
//! never depends on this loop running; it just keeps dead rows from
//! accumulating. Rows are only removed once they have been expired past
//! the grace window, so recent failures stay inspectable.

use tokio::time::{Duration, interval};
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::db::Store;

pub fn spawn(store: Store, config: SchedulerConfig) {
    if !config.purge_enabled {
        info!("Purge job disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.purge_interval_minutes * 60));
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if let Err(e) = run_once(&store, config.purge_grace_hours).await {
                error!("Purge pass failed: {e:#}");
            }
        }
    });

    info!(
        interval_minutes = config.purge_interval_minutes,
        grace_hours = config.purge_grace_hours,
        "Purge job scheduled"
    );
}

pub async fn run_once(store: &Store, grace_hours: i64) -> anyhow::Result<()> {
    let cutoff = (chrono::Utc::now() - chrono::Duration::hours(grace_hours)).to_rfc3339();

    let codes = store.pairing_repo().delete_expired_before(&cutoff).await?;
    let sessions = store.session_repo().delete_expired_before(&cutoff).await?;

    if codes > 0 || sessions > 0 {
        info!(codes, sessions, "Purged expired rows");
    } else {
        debug!("Purge pass found nothing to remove");
    }

    Ok(())
}
