use super::errors::SimError;
use super::station::{Grant, Station, StationId, Stations};
use super::time::SimTime;
use serde::Serialize;
use std::collections::VecDeque;

/// Identifier handed out by the scheduler, in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProcessId(pub(crate) u64);

impl ProcessId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "process#{}", self.0)
    }
}

/// Lifecycle of a process. Only the scheduler moves a process between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessState {
    Running,
    WaitingTimeout,
    WaitingResource,
    Terminated,
}

/// What a process asks for when it hands control back to the scheduler
#[derive(Debug, PartialEq)]
pub enum Yield<R> {
    /// Sleep for the given delay
    Timeout(SimTime),
    /// Wait for one unit of the station
    Request(StationId),
    /// Done; the value goes to the results sink
    Finish(R),
}

/// A suspendable unit of work written as an explicit state machine.
///
/// The scheduler calls `resume` when the process is first started and again
/// every time its last `Yield` is satisfied. After a `Request`, the grant is
/// waiting in the context under `take_grant`. Returning an error aborts the
/// process; the scheduler releases whatever it still holds.
pub trait Process<R> {
    fn name(&self) -> &str;

    fn resume(&mut self, ctx: &mut ProcessContext<'_>) -> Result<Yield<R>, SimError>;
}

/// View of the simulation handed to a process while it runs
pub struct ProcessContext<'a> {
    process: ProcessId,
    now: SimTime,
    stations: &'a mut Stations,
    delivered: Option<Grant>,
    handoffs: Vec<(ProcessId, Grant)>,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        process: ProcessId,
        now: SimTime,
        stations: &'a mut Stations,
        delivered: Option<Grant>,
    ) -> Self {
        Self {
            process,
            now,
            stations,
            delivered,
            handoffs: Vec::new(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn process_id(&self) -> ProcessId {
        self.process
    }

    pub fn station(&self, id: StationId) -> Result<&Station, SimError> {
        self.stations.get(id)
    }

    /// Collect the grant for the station this process last requested
    pub fn take_grant(&mut self, station: StationId) -> Result<Grant, SimError> {
        match self.delivered.take() {
            Some(grant) if grant.station() == station => Ok(grant),
            other => {
                self.delivered = other;
                Err(SimError::MissingGrant {
                    process: self.process,
                    station,
                })
            }
        }
    }

    /// Give a grant back. A waiting process picks up the capacity at this
    /// same instant and is resumed once the current process yields.
    pub fn release(&mut self, grant: Grant) -> Result<(), SimError> {
        if let Some(handoff) = self.stations.release(grant, self.now)? {
            self.handoffs.push(handoff);
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (Option<Grant>, Vec<(ProcessId, Grant)>) {
        (self.delivered, self.handoffs)
    }
}

/// One instruction of a declarative `Program`
pub enum Step {
    Delay(SimTime),
    Acquire(StationId),
    Release(StationId),
    /// Pick a continuation; not a suspension point
    Branch {
        predicate: Box<dyn FnMut(SimTime) -> bool>,
        then: Vec<Step>,
        otherwise: Vec<Step>,
    },
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Delay(delay) => write!(f, "Delay({})", delay),
            Step::Acquire(station) => write!(f, "Acquire({})", station),
            Step::Release(station) => write!(f, "Release({})", station),
            Step::Branch {
                then, otherwise, ..
            } => f
                .debug_struct("Branch")
                .field("then", then)
                .field("otherwise", otherwise)
                .finish(),
        }
    }
}

/// Output of a finished `Program`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramOutcome {
    pub name: String,
    pub started: SimTime,
    pub finished: SimTime,
}

/// A process built from an ordered list of steps.
///
/// ```
/// use lean_line_sim::core::{Program, Simulation, SimTime};
///
/// let mut sim = Simulation::new();
/// let desk = sim.add_station("desk", 1).unwrap();
/// sim.spawn(Program::new("clerk").delay(1.0).acquire(desk).delay(2.0).release(desk))
///     .unwrap();
/// sim.run(None).unwrap();
/// assert_eq!(sim.now(), SimTime::from(3.0));
/// ```
#[derive(Debug)]
pub struct Program {
    name: String,
    steps: VecDeque<Step>,
    held: Vec<Grant>,
    awaiting: Option<StationId>,
    started: Option<SimTime>,
}

impl Program {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: VecDeque::new(),
            held: Vec::new(),
            awaiting: None,
            started: None,
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push_back(step);
        self
    }

    pub fn delay(self, minutes: f64) -> Self {
        self.step(Step::Delay(SimTime::from(minutes)))
    }

    pub fn acquire(self, station: StationId) -> Self {
        self.step(Step::Acquire(station))
    }

    pub fn release(self, station: StationId) -> Self {
        self.step(Step::Release(station))
    }

    pub fn branch<F>(self, predicate: F, then: Vec<Step>, otherwise: Vec<Step>) -> Self
    where
        F: FnMut(SimTime) -> bool + 'static,
    {
        self.step(Step::Branch {
            predicate: Box::new(predicate),
            then,
            otherwise,
        })
    }
}

impl Process<ProgramOutcome> for Program {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut ProcessContext<'_>) -> Result<Yield<ProgramOutcome>, SimError> {
        if let Some(station) = self.awaiting.take() {
            let grant = ctx.take_grant(station)?;
            self.held.push(grant);
        }
        let started = *self.started.get_or_insert(ctx.now());

        while let Some(step) = self.steps.pop_front() {
            match step {
                Step::Delay(delay) => return Ok(Yield::Timeout(delay)),
                Step::Acquire(station) => {
                    self.awaiting = Some(station);
                    return Ok(Yield::Request(station));
                }
                Step::Release(station) => {
                    // Innermost acquisition of that station goes first
                    let position = self
                        .held
                        .iter()
                        .rposition(|grant| grant.station() == station)
                        .ok_or(SimError::NotAcquired {
                            process: ctx.process_id(),
                            station,
                        })?;
                    let grant = self.held.remove(position);
                    ctx.release(grant)?;
                }
                Step::Branch {
                    mut predicate,
                    then,
                    otherwise,
                } => {
                    let chosen = if predicate(ctx.now()) { then } else { otherwise };
                    for step in chosen.into_iter().rev() {
                        self.steps.push_front(step);
                    }
                }
            }
        }

        Ok(Yield::Finish(ProgramOutcome {
            name: self.name.clone(),
            started,
            finished: ctx.now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_grant_checks_station() {
        let mut stations = Stations::new();
        let assembly = stations.add("assembly", 1).unwrap();
        let inspection = stations.add("inspection", 1).unwrap();
        let grant = stations
            .request(assembly, ProcessId(0), SimTime::ZERO)
            .unwrap();

        let mut ctx = ProcessContext::new(ProcessId(0), SimTime::ZERO, &mut stations, grant);
        assert_eq!(
            ctx.take_grant(inspection).unwrap_err(),
            SimError::MissingGrant {
                process: ProcessId(0),
                station: inspection
            }
        );
        // A failed take leaves the grant in place
        assert!(ctx.take_grant(assembly).is_ok());
        assert!(ctx.take_grant(assembly).is_err());
    }

    #[test]
    fn test_program_runs_branch_inline() {
        let mut stations = Stations::new();
        let mut program = Program::new("p")
            .branch(|_| true, vec![Step::Delay(SimTime::from(4.0))], vec![])
            .delay(1.0);

        let mut ctx = ProcessContext::new(ProcessId(0), SimTime::ZERO, &mut stations, None);
        assert_eq!(
            program.resume(&mut ctx).unwrap(),
            Yield::Timeout(SimTime::from(4.0))
        );
        assert_eq!(
            program.resume(&mut ctx).unwrap(),
            Yield::Timeout(SimTime::from(1.0))
        );
        assert!(matches!(program.resume(&mut ctx).unwrap(), Yield::Finish(_)));
    }

    #[test]
    fn test_program_release_without_acquire_is_a_violation() {
        let mut stations = Stations::new();
        let packaging = stations.add("packaging", 1).unwrap();
        let mut program = Program::new("p").release(packaging);

        let mut ctx = ProcessContext::new(ProcessId(5), SimTime::ZERO, &mut stations, None);
        assert_eq!(
            program.resume(&mut ctx).unwrap_err(),
            SimError::NotAcquired {
                process: ProcessId(5),
                station: packaging
            }
        );
    }
}
