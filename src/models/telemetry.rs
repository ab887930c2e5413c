use std::{collections::BTreeMap, fmt};

use derive_more::Display;

use super::channel::CHANNEL_COUNT;

/// Telemetry topics, in the order they are published each cycle.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TelemetryKind {
    Pressure,
    Temperature,
}

const PRESSURE_FIELDS: [&str; CHANNEL_COUNT] = [
    "pressure_ch0",
    "pressure_ch1",
    "pressure_ch2",
    "pressure_ch3",
    "pressure_ch4",
    "pressure_ch5",
];

const TEMPERATURE_FIELDS: [&str; CHANNEL_COUNT] = [
    "temp_ch0", "temp_ch1", "temp_ch2", "temp_ch3", "temp_ch4", "temp_ch5",
];

impl TelemetryKind {
    /// Publication order within a cycle.
    pub const ORDER: [TelemetryKind; 2] = [TelemetryKind::Pressure, TelemetryKind::Temperature];

    /// Name of the record field holding `channel`. Fixed per channel index
    /// regardless of which other channels are active.
    pub fn field_name(&self, channel: usize) -> &'static str {
        match self {
            TelemetryKind::Pressure => PRESSURE_FIELDS[channel],
            TelemetryKind::Temperature => TEMPERATURE_FIELDS[channel],
        }
    }
}

/// One cycle's worth of values for a single telemetry topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub kind: TelemetryKind,
    pub fields: BTreeMap<&'static str, f64>,
}

impl TelemetryRecord {
    pub fn new(kind: TelemetryKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    /// Set the value for `channel` in this record.
    pub fn set(&mut self, channel: usize, value: f64) {
        self.fields.insert(self.kind.field_name(channel), value);
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} |", self.kind)?;
        for (name, value) in self.fields.iter() {
            write!(f, " {}:{}", name, value)?;
        }
        write!(f, ">")
    }
}
