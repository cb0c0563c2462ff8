use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::store::BanStore;

/// Deletes expired ban rows. Returns how many were removed, or `None` on a storage error.
pub async fn reap_once(bans: &dyn BanStore) -> Option<u64> {
    match bans.reap_expired(Utc::now()).await {
        Ok(removed) => {
            if removed > 0 {
                tracing::info!(removed, "reaped expired bans");
            }
            Some(removed)
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to reap expired bans");
            None
        }
    }
}

/// Runs [`reap_once`] every `period` for the life of the process.
pub fn spawn(bans: Arc<dyn BanStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            reap_once(bans.as_ref()).await;
        }
    })
}
