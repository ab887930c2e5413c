use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::telemetry::TelemetryRecord;

/// Task: Publish telemetry records to the log as they are emitted.
/// Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_telemetry_logging(
    token: CancellationToken,
    mut rx_telemetry: Receiver<TelemetryRecord>,
) {
    info!("Started.");
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            received = rx_telemetry.recv() => match received {
                Ok(record) => info!("Telemetry: {}", record),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Fell behind. Skipped {} telemetry records.", skipped);
                }
                Err(RecvError::Closed) => {
                    warn!("Telemetry channel closed.");
                    break;
                }
            },
        };
    }
}
