use super::clock::Clock;
use super::errors::SimError;
use super::process::{Process, ProcessContext, ProcessId, ProcessState, Yield};
use super::station::{Grant, Station, StationId, Stations};
use super::time::SimTime;
use log::{debug, error, info, trace, warn};
use std::collections::BTreeMap;

/// Observer trait for simulation events
pub trait SimulationObserver {
    /// Called when the clock moves to a later instant
    fn on_time_advance(&mut self, old_time: SimTime, new_time: SimTime);

    /// Called after every dispatched event
    fn on_event(&mut self, now: SimTime, stations: &Stations);
}

/// Callback run by the scheduler when its event comes due
pub type Callback<R> = Box<dyn FnOnce(&mut Simulation<R>) -> Result<(), SimError>>;

enum Action<R> {
    Start(ProcessId, Box<dyn Process<R>>),
    Resume(ProcessId),
    Call(Callback<R>),
}

struct ProcessSlot<R> {
    name: String,
    program: Option<Box<dyn Process<R>>>,
    state: ProcessState,
    pending_grant: Option<Grant>,
}

/// Handle returned by `spawn`; identifies the process for later queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle(ProcessId);

impl ProcessHandle {
    pub fn id(&self) -> ProcessId {
        self.0
    }
}

/// Cooperative process scheduler on top of the clock and the stations.
///
/// Single threaded: one process runs at a time, and only until it yields.
/// Processes that finish hand a value of type `R` to the results sink,
/// which is read back in registration order.
pub struct Simulation<R> {
    clock: Clock<Action<R>>,
    stations: Stations,
    processes: BTreeMap<ProcessId, ProcessSlot<R>>,
    next_process: u64,
    results: BTreeMap<ProcessId, R>,
    observers: Vec<Box<dyn SimulationObserver>>,
    events_processed: u64,
}

impl<R: 'static> Simulation<R> {
    pub fn new() -> Self {
        Self {
            clock: Clock::new(),
            stations: Stations::new(),
            processes: BTreeMap::new(),
            next_process: 0,
            results: BTreeMap::new(),
            observers: Vec::new(),
            events_processed: 0,
        }
    }

    /// Add a station with the given capacity (at least one)
    pub fn add_station(&mut self, name: &str, capacity: usize) -> Result<StationId, SimError> {
        let id = self.stations.add(name, capacity)?;
        debug!("Added station '{}' ({}) with capacity {}", name, id, capacity);
        Ok(id)
    }

    pub fn station(&self, id: StationId) -> Result<&Station, SimError> {
        self.stations.get(id)
    }

    pub fn stations(&self) -> &Stations {
        &self.stations
    }

    /// Add an observer to the simulation
    pub fn add_observer(&mut self, observer: Box<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    /// Get current simulation time
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// Check if there are pending events in the scheduler
    pub fn has_pending_events(&self) -> bool {
        self.clock.has_events()
    }

    pub fn pending_events(&self) -> usize {
        self.clock.pending()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Run `callback` after `delay`
    pub fn schedule<F>(&mut self, delay: SimTime, callback: F) -> Result<(), SimError>
    where
        F: FnOnce(&mut Simulation<R>) -> Result<(), SimError> + 'static,
    {
        self.clock.schedule(delay, Action::Call(Box::new(callback)))?;
        Ok(())
    }

    /// Register a process and run it right away, up to its first suspension
    pub fn spawn<P>(&mut self, process: P) -> Result<ProcessHandle, SimError>
    where
        P: Process<R> + 'static,
    {
        let id = self.allocate_id();
        self.start(id, Box::new(process))?;
        Ok(ProcessHandle(id))
    }

    /// Register a process that starts after `delay`.
    ///
    /// The id is assigned now, so results still come back in the order of
    /// these calls.
    pub fn spawn_at<P>(&mut self, delay: SimTime, process: P) -> Result<ProcessHandle, SimError>
    where
        P: Process<R> + 'static,
    {
        if !delay.is_valid_delay() {
            return Err(SimError::InvalidDelay(delay.as_minutes()));
        }
        let id = self.allocate_id();
        self.clock.schedule(delay, Action::Start(id, Box::new(process)))?;
        Ok(ProcessHandle(id))
    }

    /// State of a started process; `None` if it has not started yet
    pub fn state(&self, handle: ProcessHandle) -> Option<ProcessState> {
        self.processes.get(&handle.0).map(|slot| slot.state)
    }

    /// Processes that started but have not terminated
    pub fn unfinished(&self) -> Vec<(ProcessId, &str, ProcessState)> {
        self.processes
            .iter()
            .filter(|(_, slot)| slot.state != ProcessState::Terminated)
            .map(|(id, slot)| (*id, slot.name.as_str(), slot.state))
            .collect()
    }

    /// Results recorded so far, in registration order
    pub fn results(&self) -> impl Iterator<Item = (ProcessId, &R)> {
        self.results.iter().map(|(id, result)| (*id, result))
    }

    pub fn completed(&self) -> usize {
        self.results.len()
    }

    /// Move the recorded results out, in registration order
    pub fn take_results(&mut self) -> Vec<R> {
        std::mem::take(&mut self.results).into_values().collect()
    }

    /// Run until no events remain or the next one lies past `until`.
    ///
    /// Processes still waiting at the bound are left as they are; they just
    /// never report a result. Returns the final clock time.
    pub fn run(&mut self, until: Option<SimTime>) -> Result<SimTime, SimError> {
        info!(
            "Running simulation from t={} until {}",
            self.now(),
            until.map_or_else(|| "queue drains".to_string(), |t| format!("t={}", t))
        );

        while self.step_until(until)? {}

        if let Some(limit) = until {
            let old_time = self.clock.now();
            self.clock.advance_to(limit);
            self.notify_time_advance(old_time, self.clock.now());
        }

        info!(
            "Simulation stopped at t={} after {} events; {} completed, {} unfinished",
            self.now(),
            self.events_processed,
            self.results.len(),
            self.unfinished().len()
        );
        Ok(self.now())
    }

    /// Process one event, returns true if one was processed
    pub fn step(&mut self) -> Result<bool, SimError> {
        self.step_until(None)
    }

    fn step_until(&mut self, until: Option<SimTime>) -> Result<bool, SimError> {
        let old_time = self.clock.now();
        let Some(event) = self.clock.pop_due(until) else {
            return Ok(false);
        };

        self.notify_time_advance(old_time, event.time);
        trace!("Dispatching event #{} at t={}", event.sequence, event.time);

        match event.action {
            Action::Start(id, program) => self.start(id, program)?,
            Action::Resume(id) => self.drive(id)?,
            Action::Call(callback) => callback(self)?,
        }
        self.events_processed += 1;

        let now = self.clock.now();
        for observer in &mut self.observers {
            observer.on_event(now, &self.stations);
        }
        Ok(true)
    }

    fn notify_time_advance(&mut self, old_time: SimTime, new_time: SimTime) {
        if new_time != old_time {
            for observer in &mut self.observers {
                observer.on_time_advance(old_time, new_time);
            }
        }
    }

    fn allocate_id(&mut self) -> ProcessId {
        let id = ProcessId(self.next_process);
        self.next_process += 1;
        id
    }

    fn start(&mut self, id: ProcessId, program: Box<dyn Process<R>>) -> Result<(), SimError> {
        debug!("{} '{}' started at t={}", id, program.name(), self.now());
        self.processes.insert(
            id,
            ProcessSlot {
                name: program.name().to_string(),
                program: Some(program),
                state: ProcessState::Running,
                pending_grant: None,
            },
        );
        self.drive(id)
    }

    /// Resume a process and keep it running until it suspends or ends
    fn drive(&mut self, id: ProcessId) -> Result<(), SimError> {
        loop {
            let now = self.clock.now();
            let slot = self
                .processes
                .get_mut(&id)
                .ok_or(SimError::UnknownProcess(id))?;
            let mut program = slot.program.take().ok_or(SimError::ProcessTerminated(id))?;
            slot.state = ProcessState::Running;
            let delivered = slot.pending_grant.take();

            let mut ctx = ProcessContext::new(id, now, &mut self.stations, delivered);
            let outcome = program.resume(&mut ctx);
            let (unclaimed, handoffs) = ctx.into_parts();

            for (next, grant) in handoffs {
                self.hand_over(next, grant)?;
            }
            if let Some(grant) = unclaimed {
                warn!("{} did not claim its grant at {}", id, grant.station());
                if let Some((next, grant)) = self.stations.release(grant, now)? {
                    self.hand_over(next, grant)?;
                }
            }

            let step = match outcome {
                Ok(step) => step,
                Err(source) => return Err(self.abort(id, source)),
            };

            match step {
                Yield::Timeout(delay) => {
                    if let Err(source) = self.clock.schedule(delay, Action::Resume(id)) {
                        return Err(self.abort(id, source));
                    }
                    self.suspend(id, program, ProcessState::WaitingTimeout)?;
                    return Ok(());
                }
                Yield::Request(station) => match self.stations.request(station, id, now) {
                    Ok(Some(grant)) => {
                        let slot = self.slot_mut(id)?;
                        slot.program = Some(program);
                        slot.pending_grant = Some(grant);
                    }
                    Ok(None) => {
                        self.suspend(id, program, ProcessState::WaitingResource)?;
                        return Ok(());
                    }
                    Err(source) => return Err(self.abort(id, source)),
                },
                Yield::Finish(result) => {
                    drop(program);
                    if self.stations.iter().any(|station| station.is_held_by(id)) {
                        warn!("{} finished while holding capacity; releasing it", id);
                    }
                    self.terminate(id)?;
                    self.results.insert(id, result);
                    return Ok(());
                }
            }
        }
    }

    fn slot_mut(&mut self, id: ProcessId) -> Result<&mut ProcessSlot<R>, SimError> {
        self.processes
            .get_mut(&id)
            .ok_or(SimError::UnknownProcess(id))
    }

    fn suspend(
        &mut self,
        id: ProcessId,
        program: Box<dyn Process<R>>,
        state: ProcessState,
    ) -> Result<(), SimError> {
        let now = self.clock.now();
        let slot = self.slot_mut(id)?;
        slot.program = Some(program);
        slot.state = state;
        debug!("{} '{}' -> {:?} at t={}", id, slot.name, state, now);
        Ok(())
    }

    /// Capacity has moved to a waiting process; wake it at this instant
    fn hand_over(&mut self, id: ProcessId, grant: Grant) -> Result<(), SimError> {
        self.slot_mut(id)?.pending_grant = Some(grant);
        self.clock.schedule(SimTime::ZERO, Action::Resume(id))?;
        Ok(())
    }

    /// Mark a process terminated and release everything it still holds
    fn terminate(&mut self, id: ProcessId) -> Result<(), SimError> {
        let now = self.clock.now();
        for (next, grant) in self.stations.release_held_by(id, now) {
            self.hand_over(next, grant)?;
        }

        let slot = self.slot_mut(id)?;
        slot.program = None;
        slot.pending_grant = None;
        slot.state = ProcessState::Terminated;
        debug!("{} '{}' terminated at t={}", id, slot.name, now);
        Ok(())
    }

    fn abort(&mut self, id: ProcessId, source: SimError) -> SimError {
        let name = self
            .processes
            .get(&id)
            .map(|slot| slot.name.clone())
            .unwrap_or_default();
        error!("{} '{}' aborted at t={}: {}", id, name, self.now(), source);

        if let Err(cleanup) = self.terminate(id) {
            error!("Cleanup after aborting {} failed: {}", id, cleanup);
        }

        SimError::ProcessAborted {
            process: id,
            name,
            source: Box::new(source),
        }
    }
}

impl<R: 'static> Default for Simulation<R> {
    fn default() -> Self {
        Self::new()
    }
}
