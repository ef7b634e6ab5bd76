use super::config::{ConcurrencyMode, ConfigError, LineConfig};
use super::item::{ItemProcess, LineStations};
use super::random::RandomSource;
use super::report::{ItemRecord, LineReport, StationSummary};
use crate::core::{SimError, SimTime, Simulation};
use log::{info, warn};
use rayon::prelude::*;

/// Anything that can stop a line run
#[derive(Debug, Clone, PartialEq)]
pub enum LineError {
    Config(ConfigError),
    Simulation(SimError),
}

impl From<ConfigError> for LineError {
    fn from(err: ConfigError) -> Self {
        LineError::Config(err)
    }
}

impl From<SimError> for LineError {
    fn from(err: SimError) -> Self {
        LineError::Simulation(err)
    }
}

impl std::fmt::Display for LineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineError::Config(err) => write!(f, "Configuration error: {}", err),
            LineError::Simulation(err) => write!(f, "Simulation error: {}", err),
        }
    }
}

impl std::error::Error for LineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LineError::Config(err) => Some(err),
            LineError::Simulation(err) => Some(err),
        }
    }
}

/// Drives the production line: builds the stations, feeds items in at the
/// configured interval, runs the engine and gathers the report.
#[derive(Debug, Clone)]
pub struct LineSimulation {
    config: LineConfig,
}

impl LineSimulation {
    /// Validates the configuration up front; nothing runs on a bad config
    pub fn new(config: LineConfig) -> Result<Self, LineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    /// Run once with the configured seed
    pub fn run(&self) -> Result<LineReport, LineError> {
        self.run_with_seed(self.config.seed)
    }

    pub fn run_with_seed(&self, seed: u64) -> Result<LineReport, LineError> {
        let config = &self.config;
        info!(
            "Starting line run: {} items every {} min, failure rate {}, seed {}",
            config.item_count, config.arrival_interval, config.failure_rate, seed
        );

        let mut sim: Simulation<ItemRecord> = Simulation::new();
        let stations = LineStations {
            assembly: sim.add_station("assembly", config.capacities.assembly)?,
            inspection: sim.add_station("inspection", config.capacities.inspection)?,
            packaging: sim.add_station("packaging", config.capacities.packaging)?,
        };

        let random = RandomSource::new(seed);
        for index in 0..config.item_count {
            let item = ItemProcess::new(index as u64 + 1, config, stations, &random)?;
            let arrival = SimTime::from(index as f64 * config.arrival_interval);
            sim.spawn_at(arrival, item)?;
        }

        let end = sim.run(config.time_limit.map(SimTime::from))?;

        for (id, name, state) in sim.unfinished() {
            warn!("{} ({}) abandoned at t={} while {:?}", name, id, end, state);
        }

        let stations = sim
            .stations()
            .iter()
            .map(|station| StationSummary::from_station(station, end))
            .collect();
        let records = sim.take_results();
        let incomplete = config.item_count - records.len();

        let report = LineReport {
            seed,
            records,
            incomplete,
            end_time: end.as_minutes(),
            stations,
        };
        info!(
            "Line run finished at t={}: {} completed, {} incomplete",
            end,
            report.completed(),
            report.incomplete
        );
        Ok(report)
    }

    /// Run every configured replication with seeds `seed, seed + 1, ...`.
    ///
    /// Each replication is an independent single-threaded simulation, so the
    /// reports are identical whichever concurrency mode is used.
    pub fn run_replications(&self) -> Result<Vec<LineReport>, LineError> {
        let seeds: Vec<u64> = (0..self.config.replications as u64)
            .map(|k| self.config.seed.wrapping_add(k))
            .collect();

        match self.config.concurrency_mode {
            ConcurrencyMode::Sequential => seeds
                .into_iter()
                .map(|seed| self.run_with_seed(seed))
                .collect(),
            ConcurrencyMode::Rayon => seeds
                .into_par_iter()
                .map(|seed| self.run_with_seed(seed))
                .collect(),
        }
    }
}
