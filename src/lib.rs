pub mod core;
pub mod line;

// Re-export commonly used types
pub use crate::core::{Process, ProcessContext, SimError, SimTime, Simulation, StationId, Yield};
pub use crate::line::{ItemRecord, LineConfig, LineError, LineReport, LineSimulation};
