use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::ws::hub::CollabHub;

/// Periodic idle-session sweep. Spawned once at startup and runs for the
/// life of the process, independent of any connection.
pub async fn run_idle_sweeper(hub: Arc<CollabHub>, interval_secs: u64, max_idle_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        "Idle-session sweeper running every {}s (idle threshold {}s)",
        interval_secs, max_idle_secs
    );
    loop {
        ticker.tick().await;
        let removed = hub.sweep_idle_sessions(max_idle_secs).await;
        if removed > 0 {
            info!("Idle sweep removed {} session(s)", removed);
        } else {
            debug!("Idle sweep found nothing to remove");
        }
    }
}
