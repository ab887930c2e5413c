pub mod channel;
pub mod sample;
pub mod telemetry;
pub mod voltage;
