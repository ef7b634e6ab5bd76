pub mod clock;
pub mod errors;
pub mod process;
pub mod simulation_engine;
pub mod station;
pub mod time;


// Re-export commonly used types
pub use clock::{Clock, ScheduledEvent};
pub use errors::SimError;
pub use process::{Process, ProcessContext, ProcessId, ProcessState, Program, ProgramOutcome, Step, Yield};
pub use simulation_engine::{Callback, ProcessHandle, Simulation, SimulationObserver};
pub use station::{Grant, Request, Station, StationId, StationStats, Stations};
pub use time::SimTime;
