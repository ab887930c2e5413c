/// Full span of the ADAM-6024 analog input range, in volts.
pub const RANGE_SIZE: f64 = 20.0;

/// Voltage represented by a raw count of zero.
pub const RANGE_START: f64 = -10.0;

/// Largest count the controller reports.
pub const MAX_COUNT: u16 = u16::MAX;

/// Store physical unit value of an analog input voltage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voltage {
    value: f64,
}

impl Voltage {
    /// Convert a raw 16-bit controller count into volts.
    /// `0` maps to -10 V and `65535` maps to +10 V.
    pub fn from_counts(counts: u16) -> Self {
        Self {
            value: counts_to_volts(counts),
        }
    }

    /// Get a copy of the voltage this instance represents.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Linear rescale of a controller count onto the fixed input range.
pub fn counts_to_volts(counts: u16) -> f64 {
    let volts_per_count = RANGE_SIZE / MAX_COUNT as f64;
    counts as f64 * volts_per_count + RANGE_START
}
