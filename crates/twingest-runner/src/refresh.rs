//! Background twin cache refresh

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use twingest_core::TwinCache;

/// Re-read every tracked twin, first after `first_tick_after` and then every
/// `every`, until `shutdown` is cancelled
pub fn spawn_twin_refresh(
    twins: Arc<TwinCache>,
    first_tick_after: Duration,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + first_tick_after, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Twin refresh stopped");
                    break;
                }
                _ = interval.tick() => {
                    let refreshed = twins.refresh_all().await;
                    if refreshed > 0 {
                        debug!("Refreshed {} cached twins", refreshed);
                    }
                }
            }
        }
    })
}
