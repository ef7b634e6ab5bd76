use super::errors::SimError;
use super::process::ProcessId;
use super::time::SimTime;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// Index of a station inside a simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StationId(pub(crate) usize);

impl StationId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "station#{}", self.0)
    }
}

/// One unit of station capacity held by a process.
///
/// Deliberately neither `Clone` nor `Copy`: giving it back to the station
/// consumes it, so a grant can be released once at most.
#[derive(Debug, PartialEq, Eq)]
pub struct Grant {
    station: StationId,
    id: u64,
}

impl Grant {
    pub fn station(&self) -> StationId {
        self.station
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A process waiting for capacity
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub process: ProcessId,
    pub enqueue_time: SimTime,
}

/// Running counters kept by every station
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StationStats {
    /// Grants issued, immediate or after waiting
    pub grants: u64,
    /// Sum of queue waits in minutes
    pub total_wait: f64,
    /// Longest single queue wait in minutes
    pub max_wait: f64,
    /// Longest the wait queue ever got
    pub peak_queue: usize,
    /// Time-integrated `in_use`, in unit-minutes
    pub busy_time: f64,
}

impl StationStats {
    pub fn mean_wait(&self) -> f64 {
        if self.grants == 0 {
            0.0
        } else {
            self.total_wait / self.grants as f64
        }
    }
}

/// Capacity-bounded mutual exclusion with a FIFO wait queue.
#[derive(Debug)]
pub struct Station {
    id: StationId,
    name: String,
    capacity: usize,
    in_use: usize,
    wait_queue: VecDeque<Request>,
    /// grant id -> holder
    held: BTreeMap<u64, ProcessId>,
    next_grant: u64,
    stats: StationStats,
    last_change: SimTime,
}

impl Station {
    pub fn new(id: StationId, name: &str, capacity: usize) -> Result<Self, SimError> {
        if capacity == 0 {
            return Err(SimError::InvalidCapacity {
                station: name.to_string(),
                capacity,
            });
        }

        Ok(Self {
            id,
            name: name.to_string(),
            capacity,
            in_use: 0,
            wait_queue: VecDeque::new(),
            held: BTreeMap::new(),
            next_grant: 0,
            stats: StationStats::default(),
            last_change: SimTime::ZERO,
        })
    }

    pub fn id(&self) -> StationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    pub fn queue_len(&self) -> usize {
        self.wait_queue.len()
    }

    /// Waiting requests, head first
    pub fn waiting(&self) -> impl Iterator<Item = &Request> {
        self.wait_queue.iter()
    }

    /// Processes currently holding capacity, in grant order
    pub fn holders(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.held.values().copied()
    }

    pub fn is_held_by(&self, process: ProcessId) -> bool {
        self.held.values().any(|holder| *holder == process)
    }

    /// Statistics with busy time accumulated up to `now`
    pub fn stats_at(&self, now: SimTime) -> StationStats {
        let mut stats = self.stats.clone();
        if now > self.last_change {
            stats.busy_time += self.in_use as f64 * (now - self.last_change).as_minutes();
        }
        stats
    }

    /// Fraction of capacity kept busy over `elapsed` minutes
    pub fn utilization(&self, elapsed: SimTime) -> f64 {
        let minutes = elapsed.as_minutes();
        if minutes <= 0.0 {
            return 0.0;
        }
        self.stats_at(elapsed).busy_time / (minutes * self.capacity as f64)
    }

    /// Ask for one unit of capacity.
    ///
    /// Returns the grant straight away when capacity is free; otherwise the
    /// request joins the tail of the queue and `None` is returned.
    pub fn request(&mut self, process: ProcessId, now: SimTime) -> Option<Grant> {
        if self.in_use < self.capacity {
            return Some(self.issue(process, now));
        }

        self.wait_queue.push_back(Request {
            process,
            enqueue_time: now,
        });
        self.stats.peak_queue = self.stats.peak_queue.max(self.wait_queue.len());
        debug!(
            "{} queued at '{}' (queue length {})",
            process,
            self.name,
            self.wait_queue.len()
        );
        None
    }

    /// Give a grant back.
    ///
    /// If somebody is waiting, the freed unit goes to the head of the queue
    /// at once and the new holder is returned so the caller can wake it.
    pub fn release(
        &mut self,
        grant: Grant,
        now: SimTime,
    ) -> Result<Option<(ProcessId, Grant)>, SimError> {
        if grant.station != self.id {
            return Err(SimError::ForeignGrant {
                issued_by: grant.station,
                released_at: self.id,
            });
        }

        let holder = self.held.remove(&grant.id).ok_or_else(|| SimError::GrantNotHeld {
            station: self.name.clone(),
            grant: grant.id,
        })?;

        self.account(now);
        self.in_use -= 1;
        debug!("{} released '{}' at t={}", holder, self.name, now);

        Ok(self.grant_next(now))
    }

    /// Drop every grant and queued request belonging to `process`.
    ///
    /// Used when a process exits; returns the waiting processes that picked
    /// up the freed capacity.
    pub fn release_held_by(&mut self, process: ProcessId, now: SimTime) -> Vec<(ProcessId, Grant)> {
        self.wait_queue.retain(|request| request.process != process);

        let owned: Vec<u64> = self
            .held
            .iter()
            .filter(|(_, holder)| **holder == process)
            .map(|(id, _)| *id)
            .collect();

        let mut handoffs = Vec::new();
        for id in owned {
            self.held.remove(&id);
            self.account(now);
            self.in_use -= 1;
            debug!("{} auto-released '{}' at t={}", process, self.name, now);
            if let Some(handoff) = self.grant_next(now) {
                handoffs.push(handoff);
            }
        }
        handoffs
    }

    fn grant_next(&mut self, now: SimTime) -> Option<(ProcessId, Grant)> {
        let request = self.wait_queue.pop_front()?;
        let wait = (now - request.enqueue_time).as_minutes();
        self.stats.total_wait += wait;
        self.stats.max_wait = self.stats.max_wait.max(wait);

        let grant = self.issue(request.process, now);
        Some((request.process, grant))
    }

    fn issue(&mut self, process: ProcessId, now: SimTime) -> Grant {
        debug_assert!(self.in_use < self.capacity, "station over capacity");
        self.account(now);

        let id = self.next_grant;
        self.next_grant += 1;
        self.in_use += 1;
        self.held.insert(id, process);
        self.stats.grants += 1;
        debug!("{} granted '{}' at t={}", process, self.name, now);

        Grant {
            station: self.id,
            id,
        }
    }

    fn account(&mut self, now: SimTime) {
        if now > self.last_change {
            self.stats.busy_time += self.in_use as f64 * (now - self.last_change).as_minutes();
            self.last_change = now;
        }
    }
}

/// All stations of one simulation, addressed by `StationId`.
#[derive(Debug, Default)]
pub struct Stations {
    stations: Vec<Station>,
}

impl Stations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, capacity: usize) -> Result<StationId, SimError> {
        let id = StationId(self.stations.len());
        self.stations.push(Station::new(id, name, capacity)?);
        Ok(id)
    }

    pub fn get(&self, id: StationId) -> Result<&Station, SimError> {
        self.stations.get(id.0).ok_or(SimError::UnknownStation(id))
    }

    pub fn get_mut(&mut self, id: StationId) -> Result<&mut Station, SimError> {
        self.stations.get_mut(id.0).ok_or(SimError::UnknownStation(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn request(
        &mut self,
        id: StationId,
        process: ProcessId,
        now: SimTime,
    ) -> Result<Option<Grant>, SimError> {
        Ok(self.get_mut(id)?.request(process, now))
    }

    /// Release a grant at the station that issued it
    pub fn release(
        &mut self,
        grant: Grant,
        now: SimTime,
    ) -> Result<Option<(ProcessId, Grant)>, SimError> {
        self.get_mut(grant.station)?.release(grant, now)
    }

    pub fn release_held_by(&mut self, process: ProcessId, now: SimTime) -> Vec<(ProcessId, Grant)> {
        self.stations
            .iter_mut()
            .flat_map(|station| station.release_held_by(process, now))
            .collect()
    }
}
