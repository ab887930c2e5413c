use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::voltage::MAX_COUNT;

/// Count that lands nearest to 0 V from below.
const JUST_BELOW_ZERO: u16 = 32767;

/// Count that lands nearest to 0 V from above.
const JUST_ABOVE_ZERO: u16 = 32768;

/// Periods of the two time varying inputs, in seconds of wall clock per radian.
const CHANNEL_0_PERIOD: f64 = 7.0;
const CHANNEL_5_PERIOD: f64 = 11.0;

type Clock = Box<dyn Fn() -> f64 + Send + Sync>;

/// Stand-in for an ADAM-6024 that answers input register reads in process.
///
/// Channels 1 and 2 sit at the bottom and top of the input range, channels
/// 3 and 4 straddle zero volts, and channels 0 and 5 follow rectified sine
/// waves of wall clock time so consumers can see values change.
pub struct SimulatedController {
    clock: Clock,
}

impl SimulatedController {
    pub fn new() -> Self {
        Self::with_clock(wall_clock_seconds)
    }

    /// Drive the time varying channels from `clock`, in seconds.
    pub fn with_clock(clock: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        Self {
            clock: Box::new(clock),
        }
    }

    /// Answer a read of `count` input registers starting at `address`.
    /// Registers past the six analog inputs read as zero.
    pub fn read_input_registers(&self, address: u16, count: u16) -> Vec<u16> {
        let now = (self.clock)();
        let inputs = [
            rectified_sine(now, CHANNEL_0_PERIOD),
            0,
            MAX_COUNT,
            JUST_BELOW_ZERO,
            JUST_ABOVE_ZERO,
            rectified_sine(now, CHANNEL_5_PERIOD),
        ];

        (address..address.saturating_add(count))
            .map(|register| inputs.get(register as usize).copied().unwrap_or(0))
            .collect()
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

fn rectified_sine(seconds: f64, period: f64) -> u16 {
    ((seconds / period).sin().abs() * MAX_COUNT as f64) as u16
}

/// Clock that starts at `start` seconds and advances by `step` on every read.
#[cfg(test)]
pub(crate) fn stepping_clock(start: f64, step: f64) -> impl Fn() -> f64 + Send + Sync + 'static {
    use std::sync::atomic::{AtomicU32, Ordering};

    let reads = AtomicU32::new(0);
    move || start + step * reads.fetch_add(1, Ordering::SeqCst) as f64
}

fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}
