use super::process::ProcessId;
use super::station::StationId;

/// Errors raised by the simulation engine.
///
/// Everything here is fatal: a delay or capacity that is out of range is a
/// setup mistake, and a bad release is a broken process contract. The
/// scheduler never retries.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// Delay was negative, NaN or infinite
    InvalidDelay(f64),
    /// Station capacity must be at least one
    InvalidCapacity { station: String, capacity: usize },
    /// Station id does not belong to this simulation
    UnknownStation(StationId),
    /// Process id does not belong to this simulation
    UnknownProcess(ProcessId),
    /// Grant was released at a station that did not issue it
    ForeignGrant { issued_by: StationId, released_at: StationId },
    /// Grant is not currently held at the station
    GrantNotHeld { station: String, grant: u64 },
    /// Process asked for a grant it was never given
    MissingGrant { process: ProcessId, station: StationId },
    /// Process released a station it does not hold
    NotAcquired { process: ProcessId, station: StationId },
    /// Process was resumed after it terminated
    ProcessTerminated(ProcessId),
    /// A process continuation failed and was aborted
    ProcessAborted {
        process: ProcessId,
        name: String,
        source: Box<SimError>,
    },
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::InvalidDelay(delay) => {
                write!(f, "Invalid delay: {} (must be finite and non-negative)", delay)
            }
            SimError::InvalidCapacity { station, capacity } => write!(
                f,
                "Invalid capacity {} for station '{}' (must be at least 1)",
                capacity, station
            ),
            SimError::UnknownStation(id) => write!(f, "Unknown station: {}", id),
            SimError::UnknownProcess(id) => write!(f, "Unknown process: {}", id),
            SimError::ForeignGrant {
                issued_by,
                released_at,
            } => write!(
                f,
                "Grant issued by {} cannot be released at {}",
                issued_by, released_at
            ),
            SimError::GrantNotHeld { station, grant } => write!(
                f,
                "Grant #{} is not held at station '{}'",
                grant, station
            ),
            SimError::MissingGrant { process, station } => write!(
                f,
                "Process {} has no pending grant from {}",
                process, station
            ),
            SimError::NotAcquired { process, station } => write!(
                f,
                "Process {} released {} without holding it",
                process, station
            ),
            SimError::ProcessTerminated(id) => {
                write!(f, "Process {} was resumed after terminating", id)
            }
            SimError::ProcessAborted {
                process,
                name,
                source,
            } => write!(f, "Process {} ('{}') aborted: {}", process, name, source),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::ProcessAborted { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
