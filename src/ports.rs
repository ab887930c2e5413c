use std::future::Future;

use tokio::sync::broadcast::Sender;
use tracing::{debug, warn};

use crate::{
    externals::device::LinkError,
    models::{sample::RawSample, telemetry::TelemetryRecord},
};

/// Source of analog input readings. Implemented by the device session for
/// both the real controller and the simulator, and by test doubles.
pub trait AnalogInputDevice: Send {
    /// Read every channel once.
    fn read_all(&mut self) -> impl Future<Output = Result<RawSample, LinkError>> + Send;

    /// Release the link. Never fails; teardown problems are logged and
    /// swallowed since callers are shutting down regardless.
    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;
}

/// Destination for telemetry records.
pub trait TelemetryPort {
    fn publish(&self, record: TelemetryRecord);
}

impl TelemetryPort for Sender<TelemetryRecord> {
    fn publish(&self, record: TelemetryRecord) {
        let kind = record.kind;
        if let Err(e) = self.send(record) {
            warn!("Failed to broadcast {} telemetry. Error: {}", kind, e);
        } else {
            debug!("Sent a {} telemetry record.", kind);
        }
    }
}
