pub mod session;
pub mod simulator;

pub use session::{DeviceEndpoint, DeviceSession, LinkError, LinkFailure, SessionMode, SessionState};
pub use simulator::SimulatedController;
