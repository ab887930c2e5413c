use std::fmt::Display;

use super::{channel::CHANNEL_COUNT, voltage::Voltage};

/// Raw counts from one read of the controller, in channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub counts: [u16; CHANNEL_COUNT],
}

/// Calibrated values for one read, in channel order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalSample {
    pub values: [f64; CHANNEL_COUNT],
}

impl RawSample {
    pub fn new(counts: [u16; CHANNEL_COUNT]) -> Self {
        Self { counts }
    }

    /// Build a sample from a register block. Returns `None` if fewer than
    /// `CHANNEL_COUNT` registers are present; extra registers are ignored.
    pub fn from_registers(registers: &[u16]) -> Option<Self> {
        let counts: [u16; CHANNEL_COUNT] = registers.get(..CHANNEL_COUNT)?.try_into().ok()?;
        Some(Self { counts })
    }

    pub fn voltages(&self) -> [Voltage; CHANNEL_COUNT] {
        self.counts.map(Voltage::from_counts)
    }
}

impl Display for RawSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(RawSample: counts={:?})", self.counts)
    }
}

impl Display for PhysicalSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(PhysicalSample: values={:?})", self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_registers() {
        let sample = RawSample::from_registers(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(sample.counts, [1, 2, 3, 4, 5, 6]);

        let sample = RawSample::from_registers(&[9, 8, 7, 6, 5, 4]).unwrap();
        assert_eq!(sample.counts, [9, 8, 7, 6, 5, 4]);

        assert_eq!(RawSample::from_registers(&[1, 2, 3]), None);
        assert_eq!(RawSample::from_registers(&[]), None);
    }

    #[test]
    fn test_voltages() {
        let volts = RawSample::new([0, 65535, 0, 0, 0, 0]).voltages();
        assert_eq!(volts[0].value(), -10.0);
        assert!((volts[1].value() - 10.0).abs() < 1e-9);
    }
}
