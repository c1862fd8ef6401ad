//! Device-wide staleness watchdog.
//!
//! Runs on its own fixed cadence, independent of the publish path, so a
//! silent producer is noticed even when nothing else is happening. The
//! expected polling interval is read fresh on every tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertEngine;
use crate::hub::Hub;
use crate::polling::PollingControl;

/// Run the watchdog loop until `cancel` is triggered.
pub async fn run(
    alerts: Arc<AlertEngine>,
    hub: Arc<Hub>,
    polling: Arc<PollingControl>,
    cadence: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(cadence_secs = cadence.as_secs(), "Staleness watchdog started");

    let mut interval = tokio::time::interval(cadence);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Staleness watchdog stopping");
                break;
            }
            _ = interval.tick() => {
                let expected = polling.current().as_duration();
                match alerts.check_staleness(expected) {
                    Some(alert) => hub.publish_alert(alert).await,
                    None => tracing::trace!(state = ?alerts.watchdog_state(), "Watchdog tick"),
                }
            }
        }
    }
}
