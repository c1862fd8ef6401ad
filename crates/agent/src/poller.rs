//! Device polling loop.
//!
//! Each cycle reads the register block, decodes it into a [`Measurement`]
//! and hands it to the session through a bounded outbox. A failed read is
//! logged and skipped; the cycle cadence is kept regardless. The polling
//! interval is read from a `watch` channel at the top of every cycle, so a
//! change from the backend applies from the next cycle on.

use chrono::Utc;
use thermogate_core::measurement::Measurement;
use thermogate_core::polling::PollInterval;
use thermogate_core::registers::{channel_labels, decode_registers, RegisterBlock};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, ReadError};
use crate::modbus::RegisterReader;

/// What to read and how to label it.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub device_id: String,
    pub block: RegisterBlock,
    pub scale_divisor: f64,
    pub channel_prefix: String,
}

impl PollSettings {
    fn channels(&self) -> Vec<String> {
        channel_labels(&self.channel_prefix, self.block.count)
    }
}

/// Read and decode one measurement.
pub async fn poll_once<R: RegisterReader + ?Sized>(
    reader: &mut R,
    settings: &PollSettings,
) -> Result<Measurement, AgentError> {
    let raw = reader.read(settings.block).await?;
    if raw.len() != usize::from(settings.block.count) {
        return Err(ReadError::ShortRead {
            expected: usize::from(settings.block.count),
            got: raw.len(),
        }
        .into());
    }
    let values = decode_registers(&raw, settings.scale_divisor);
    let timestamp = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
    Ok(Measurement::new(
        settings.device_id.clone(),
        timestamp,
        settings.channels(),
        values,
        raw,
    )?)
}

/// Poll until cancelled or the outbox is closed.
pub async fn run<R: RegisterReader>(
    mut reader: R,
    settings: PollSettings,
    mut interval: watch::Receiver<PollInterval>,
    outbox: mpsc::Sender<Measurement>,
    cancel: CancellationToken,
) {
    tracing::info!(
        device_id = %settings.device_id,
        start = settings.block.start,
        count = settings.block.count,
        "Poller started"
    );

    loop {
        let started = Instant::now();
        let period = interval.borrow_and_update().as_duration();

        match poll_once(&mut reader, &settings).await {
            Ok(measurement) => match outbox.try_send(measurement) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(dropped)) => {
                    tracing::warn!(
                        timestamp = dropped.timestamp(),
                        "Outbox full, dropping measurement"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::info!("Outbox closed, poller stopping");
                    return;
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Polling cycle failed");
            }
        }

        let wait = period.saturating_sub(started.elapsed());
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::info!("Poller cancelled");
                return;
            }
            () = tokio::time::sleep(wait) => {}
        }
    }
}
