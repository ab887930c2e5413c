use std::time::Duration;

use futures::StreamExt;
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    externals::device::LinkError,
    models::{
        channel::{ChannelConfig, ChannelKind, ConfigurationError, Polynomial, CHANNEL_COUNT},
        sample::{PhysicalSample, RawSample},
        telemetry::{TelemetryKind, TelemetryRecord},
    },
    ports::{AnalogInputDevice, TelemetryPort},
};

/// Routing and calibration for every analog input, captured once when
/// sampling starts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelTable {
    channels: [ChannelConfig; CHANNEL_COUNT],
}

impl ChannelTable {
    /// Build the table. Exactly `CHANNEL_COUNT` channels are required.
    pub fn new(channels: Vec<ChannelConfig>) -> Result<Self, ConfigurationError> {
        let count = channels.len();
        let channels: [ChannelConfig; CHANNEL_COUNT] = channels
            .try_into()
            .map_err(|_| ConfigurationError::ChannelCount(count))?;
        Ok(Self { channels })
    }

    pub fn kind(&self, channel: usize) -> ChannelKind {
        self.channels[channel].kind
    }

    pub fn polynomial(&self, channel: usize) -> &Polynomial {
        &self.channels[channel].polynomial
    }

    /// Apply each channel's calibration to its voltage.
    pub fn convert(&self, raw: &RawSample) -> PhysicalSample {
        let voltages = raw.voltages();
        let mut values = [0f64; CHANNEL_COUNT];
        for (channel, value) in values.iter_mut().enumerate() {
            *value = self.channels[channel]
                .polynomial
                .evaluate(voltages[channel].value());
        }
        PhysicalSample { values }
    }

    /// Group calibrated values into one record per telemetry kind that has at
    /// least one channel, in publication order. Unused channels are dropped.
    pub fn records(&self, sample: &PhysicalSample) -> Vec<TelemetryRecord> {
        TelemetryKind::ORDER
            .iter()
            .filter_map(|kind| {
                let mut record = TelemetryRecord::new(*kind);
                for (channel, config) in self.channels.iter().enumerate() {
                    if config.kind.telemetry_kind() == Some(*kind) {
                        record.set(channel, sample.values[channel]);
                    }
                }
                (!record.is_empty()).then_some(record)
            })
            .collect()
    }
}

/// Task: Poll the controller on a fixed cadence, calibrate every channel and
/// publish pressure then temperature telemetry. Can be cancelled.
///
/// Owns `device` for its whole life and always disconnects it before
/// returning. A link failure ends the task with that error; cancellation ends
/// it with `Ok(())`. A read that is in flight when cancellation arrives is
/// allowed to finish but its values are discarded.
#[tracing::instrument(skip_all)]
pub async fn task_sample_analog_inputs<D, T>(
    token: CancellationToken,
    mut device: D,
    table: ChannelTable,
    cadence: Duration,
    telemetry: T,
) -> Result<(), LinkError>
where
    D: AnalogInputDevice,
    T: TelemetryPort,
{
    info!("Started.");
    let result = sampling_loop(&token, &mut device, &table, cadence, &telemetry).await;
    if let Err(e) = &result {
        warn!("Stopping after link failure. Error: {}", e);
    }
    device.disconnect().await;
    result
}

async fn sampling_loop<D, T>(
    token: &CancellationToken,
    device: &mut D,
    table: &ChannelTable,
    cadence: Duration,
    telemetry: &T,
) -> Result<(), LinkError>
where
    D: AnalogInputDevice,
    T: TelemetryPort,
{
    let mut timer = interval(cadence);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = IntervalStream::new(timer);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!("Cancelled.");
                return Ok(());
            },
            _ = ticks.next() => {}
        };

        let outcome = device.read_all().await;
        if token.is_cancelled() {
            warn!("Cancelled during read. Discarding cycle.");
            return Ok(());
        }

        business_logic(table, &outcome?, telemetry);
    }
}

/// Perform task business logic. Calibrate one read and publish its records.
fn business_logic<T: TelemetryPort>(table: &ChannelTable, raw: &RawSample, telemetry: &T) {
    trace!("Executing business logic.");
    let sample = table.convert(raw);
    debug!("Calibrated {}.", sample);
    for record in table.records(&sample) {
        telemetry.publish(record);
    }
}
