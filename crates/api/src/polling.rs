//! Runtime-mutable polling interval.
//!
//! The value lives in a `watch` channel: the staleness watchdog reads it
//! fresh on every tick and producers are told about changes with a
//! `set_interval` command. Nothing already in flight is interrupted.

use thermogate_core::polling::PollInterval;
use thermogate_core::protocol::ProducerCommand;
use tokio::sync::watch;

use crate::hub::Hub;

pub struct PollingControl {
    tx: watch::Sender<PollInterval>,
}

impl PollingControl {
    pub fn new(initial: PollInterval) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> PollInterval {
        *self.tx.borrow()
    }

    /// Store the new interval and push it to every connected producer.
    /// Returns the number of producers notified.
    pub async fn set(&self, interval: PollInterval, hub: &Hub) -> usize {
        self.tx.send_replace(interval);
        let notified = hub
            .broadcast_command(&ProducerCommand::SetInterval {
                interval_ms: interval,
            })
            .await;
        tracing::info!(
            interval_ms = interval.as_millis(),
            notified,
            "Polling interval changed"
        );
        notified
    }

    /// The command a newly connected producer should receive.
    pub fn command(&self) -> ProducerCommand {
        ProducerCommand::SetInterval {
            interval_ms: self.current(),
        }
    }
}
