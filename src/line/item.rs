use super::config::{ConfigError, LineConfig, StageDurations};
use super::random::RandomSource;
use super::report::ItemRecord;
use crate::core::{Grant, Process, ProcessContext, SimError, SimTime, StationId, Yield};
use log::debug;
use rand::rngs::StdRng;
use rand_distr::{Bernoulli, Distribution};

/// The three shared stations of the line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineStations {
    pub assembly: StationId,
    pub inspection: StationId,
    pub packaging: StationId,
}

/// Where an item currently is. Held grants travel with the state that
/// needs them.
#[derive(Debug)]
enum ItemState {
    Arriving,
    Intake,
    WaitingAssembly,
    Assembling(Grant),
    Transport,
    WaitingInspection,
    Inspecting(Grant),
    WaitingRework { inspection: Grant },
    Reworking { inspection: Grant, assembly: Grant },
    WaitingPackaging,
    Packaging(Grant),
    Done,
}

/// One item travelling through the line.
///
/// Intake, assembly, transport, inspection (with an optional trip back to
/// assembly while inspection stays held) and packaging. Assembly,
/// inspection and rework count as value-adding.
#[derive(Debug)]
pub struct ItemProcess {
    item_id: u64,
    name: String,
    durations: StageDurations,
    stations: LineStations,
    failure: Bernoulli,
    rng: StdRng,
    state: ItemState,
    started: SimTime,
    value_added: f64,
    reworked: bool,
}

impl ItemProcess {
    pub fn new(
        item_id: u64,
        config: &LineConfig,
        stations: LineStations,
        random: &RandomSource,
    ) -> Result<Self, ConfigError> {
        let failure = Bernoulli::new(config.failure_rate)
            .map_err(|_| ConfigError::InvalidFailureRate(config.failure_rate))?;

        Ok(Self {
            item_id,
            name: format!("Item_{}", item_id),
            durations: config.durations.clone(),
            stations,
            failure,
            rng: random.stream(item_id),
            state: ItemState::Arriving,
            started: SimTime::ZERO,
            value_added: 0.0,
            reworked: false,
        })
    }

    pub fn item_id(&self) -> u64 {
        self.item_id
    }
}

impl Process<ItemRecord> for ItemProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut ProcessContext<'_>) -> Result<Yield<ItemRecord>, SimError> {
        let durations = &self.durations;
        let stations = self.stations;

        let step = match std::mem::replace(&mut self.state, ItemState::Done) {
            ItemState::Arriving => {
                self.started = ctx.now();
                debug!("{} arrived at t={}", self.name, self.started);
                self.state = ItemState::Intake;
                Yield::Timeout(SimTime::from(durations.intake))
            }
            ItemState::Intake => {
                self.state = ItemState::WaitingAssembly;
                Yield::Request(stations.assembly)
            }
            ItemState::WaitingAssembly => {
                let grant = ctx.take_grant(stations.assembly)?;
                self.state = ItemState::Assembling(grant);
                Yield::Timeout(SimTime::from(durations.assembly))
            }
            ItemState::Assembling(grant) => {
                ctx.release(grant)?;
                self.value_added += durations.assembly;
                self.state = ItemState::Transport;
                Yield::Timeout(SimTime::from(durations.transport))
            }
            ItemState::Transport => {
                self.state = ItemState::WaitingInspection;
                Yield::Request(stations.inspection)
            }
            ItemState::WaitingInspection => {
                let grant = ctx.take_grant(stations.inspection)?;
                self.state = ItemState::Inspecting(grant);
                Yield::Timeout(SimTime::from(durations.inspection))
            }
            ItemState::Inspecting(inspection) => {
                self.value_added += durations.inspection;
                if self.failure.sample(&mut self.rng) {
                    debug!("{} failed inspection at t={}", self.name, ctx.now());
                    self.reworked = true;
                    self.state = ItemState::WaitingRework { inspection };
                    Yield::Request(stations.assembly)
                } else {
                    ctx.release(inspection)?;
                    self.state = ItemState::WaitingPackaging;
                    Yield::Request(stations.packaging)
                }
            }
            ItemState::WaitingRework { inspection } => {
                let assembly = ctx.take_grant(stations.assembly)?;
                self.state = ItemState::Reworking {
                    inspection,
                    assembly,
                };
                Yield::Timeout(SimTime::from(durations.assembly))
            }
            ItemState::Reworking {
                inspection,
                assembly,
            } => {
                ctx.release(assembly)?;
                self.value_added += durations.assembly;
                ctx.release(inspection)?;
                self.state = ItemState::WaitingPackaging;
                Yield::Request(stations.packaging)
            }
            ItemState::WaitingPackaging => {
                let grant = ctx.take_grant(stations.packaging)?;
                self.state = ItemState::Packaging(grant);
                Yield::Timeout(SimTime::from(durations.packaging))
            }
            ItemState::Packaging(grant) => {
                ctx.release(grant)?;
                let total_time = (ctx.now() - self.started).as_minutes();
                debug!(
                    "{} done at t={}: total {:.2}, value-added {:.2}",
                    self.name,
                    ctx.now(),
                    total_time,
                    self.value_added
                );
                Yield::Finish(ItemRecord {
                    item_id: self.item_id,
                    name: self.name.clone(),
                    total_time,
                    value_added_time: self.value_added,
                    reworked: self.reworked,
                })
            }
            ItemState::Done => return Err(SimError::ProcessTerminated(ctx.process_id())),
        };

        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ProcessState, Simulation};

    fn line(sim: &mut Simulation<ItemRecord>) -> LineStations {
        LineStations {
            assembly: sim.add_station("assembly", 1).unwrap(),
            inspection: sim.add_station("inspection", 1).unwrap(),
            packaging: sim.add_station("packaging", 1).unwrap(),
        }
    }

    #[test]
    fn test_item_waits_at_each_stage() {
        let mut sim = Simulation::new();
        let stations = line(&mut sim);
        let config = LineConfig::new().with_failure_rate(0.0);
        let item = ItemProcess::new(1, &config, stations, &RandomSource::new(1)).unwrap();
        let handle = sim.spawn(item).unwrap();

        // Intake
        assert_eq!(sim.state(handle), Some(ProcessState::WaitingTimeout));
        sim.run(Some(SimTime::from(4.0))).unwrap();
        assert_eq!(sim.station(stations.assembly).unwrap().in_use(), 1);

        sim.run(Some(SimTime::from(9.0))).unwrap();
        assert_eq!(sim.station(stations.assembly).unwrap().in_use(), 0);
        assert_eq!(sim.station(stations.inspection).unwrap().in_use(), 0);

        sim.run(Some(SimTime::from(11.0))).unwrap();
        assert_eq!(sim.station(stations.inspection).unwrap().in_use(), 1);

        sim.run(None).unwrap();
        assert_eq!(sim.state(handle), Some(ProcessState::Terminated));
        let records = sim.take_results();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Item_1");
        assert_eq!(records[0].total_time, 15.0);
        assert_eq!(records[0].value_added_time, 8.0);
        assert!(!records[0].reworked);
    }

    #[test]
    fn test_rework_holds_inspection_during_assembly() {
        let mut sim = Simulation::new();
        let stations = line(&mut sim);
        let config = LineConfig::new().with_failure_rate(1.0);
        let item = ItemProcess::new(1, &config, stations, &RandomSource::new(1)).unwrap();
        sim.spawn(item).unwrap();

        // Inspection ends at 13, rework runs 13..18
        sim.run(Some(SimTime::from(15.0))).unwrap();
        assert_eq!(sim.station(stations.inspection).unwrap().in_use(), 1);
        assert_eq!(sim.station(stations.assembly).unwrap().in_use(), 1);

        sim.run(None).unwrap();
        let records = sim.take_results();
        assert_eq!(records[0].total_time, 20.0);
        assert_eq!(records[0].value_added_time, 13.0);
        assert!(records[0].reworked);
    }

    #[test]
    fn test_invalid_failure_rate_is_a_config_error() {
        let stations = LineStations {
            assembly: StationId(0),
            inspection: StationId(1),
            packaging: StationId(2),
        };
        let config = LineConfig::new().with_failure_rate(2.0);
        assert_eq!(
            ItemProcess::new(1, &config, stations, &RandomSource::new(1)).unwrap_err(),
            ConfigError::InvalidFailureRate(2.0)
        );
    }
}
