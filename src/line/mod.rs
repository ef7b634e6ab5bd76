//! The production line built on the simulation core: configuration, the
//! per-item process, the driver and its reports.

pub mod config;
pub mod driver;
pub mod item;
pub mod random;
pub mod report;

// Re-export commonly used types
pub use config::{ConcurrencyMode, ConfigError, LineConfig, StageDurations, StationCapacities};
pub use driver::{LineError, LineSimulation};
pub use item::{ItemProcess, LineStations};
pub use random::RandomSource;
pub use report::{ItemRecord, LineReport, ReplicationSummary, StationSummary};
