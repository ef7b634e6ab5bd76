use crate::core::{SimTime, Station};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one item that made it through the line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// 1-based position in the arrival sequence
    pub item_id: u64,
    pub name: String,
    /// Lead time: arrival to leaving packaging
    pub total_time: f64,
    /// Assembly, inspection and rework minutes
    pub value_added_time: f64,
    pub reworked: bool,
}

impl ItemRecord {
    pub fn value_added_ratio(&self) -> f64 {
        if self.total_time > 0.0 {
            self.value_added_time / self.total_time
        } else {
            0.0
        }
    }
}

/// Per-station figures at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSummary {
    pub name: String,
    pub capacity: usize,
    pub grants: u64,
    pub mean_wait: f64,
    pub max_wait: f64,
    pub peak_queue: usize,
    pub utilization: f64,
}

impl StationSummary {
    pub fn from_station(station: &Station, now: SimTime) -> Self {
        let stats = station.stats_at(now);
        Self {
            name: station.name().to_string(),
            capacity: station.capacity(),
            grants: stats.grants,
            mean_wait: stats.mean_wait(),
            max_wait: stats.max_wait,
            peak_queue: stats.peak_queue,
            utilization: station.utilization(now),
        }
    }
}

/// Results of a single line simulation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineReport {
    pub seed: u64,
    /// Completed items in arrival order
    pub records: Vec<ItemRecord>,
    /// Items still in the line when the time limit hit
    pub incomplete: usize,
    pub end_time: f64,
    pub stations: Vec<StationSummary>,
}

impl LineReport {
    pub fn completed(&self) -> usize {
        self.records.len()
    }

    pub fn total_lead_time(&self) -> f64 {
        self.records.iter().map(|r| r.total_time).sum()
    }

    pub fn total_value_added_time(&self) -> f64 {
        self.records.iter().map(|r| r.value_added_time).sum()
    }

    pub fn mean_lead_time(&self) -> Option<f64> {
        self.mean_of(|r| r.total_time)
    }

    pub fn mean_value_added_time(&self) -> Option<f64> {
        self.mean_of(|r| r.value_added_time)
    }

    /// Value-added share of total lead time, in percent
    pub fn efficiency(&self) -> Option<f64> {
        let lead = self.total_lead_time();
        if lead > 0.0 {
            Some(100.0 * self.total_value_added_time() / lead)
        } else {
            None
        }
    }

    pub fn rework_count(&self) -> usize {
        self.records.iter().filter(|r| r.reworked).count()
    }

    fn mean_of(&self, field: impl Fn(&ItemRecord) -> f64) -> Option<f64> {
        if self.records.is_empty() {
            None
        } else {
            Some(self.records.iter().map(field).sum::<f64>() / self.records.len() as f64)
        }
    }
}

fn or_dash(value: Option<f64>, suffix: &str) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}{}", v, suffix))
}

impl fmt::Display for LineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Results (seed {}, stopped at t={:.2}):", self.seed, self.end_time)?;
        for record in &self.records {
            writeln!(
                f,
                "{}: total time = {:.2} min, value-added time = {:.2} min{}",
                record.name,
                record.total_time,
                record.value_added_time,
                if record.reworked { " (reworked)" } else { "" }
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Completed: {}  Incomplete: {}  Reworked: {}",
            self.completed(),
            self.incomplete,
            self.rework_count()
        )?;
        writeln!(f, "Average lead time: {}", or_dash(self.mean_lead_time(), " min"))?;
        writeln!(
            f,
            "Average value-added time: {}",
            or_dash(self.mean_value_added_time(), " min")
        )?;
        writeln!(f, "Value-added / lead time: {}", or_dash(self.efficiency(), "%"))?;

        writeln!(f)?;
        writeln!(f, "Stations:")?;
        for station in &self.stations {
            writeln!(
                f,
                "  {:<10} cap {}  grants {:>3}  mean wait {:>6.2}  max wait {:>6.2}  peak queue {:>3}  utilization {:>5.1}%",
                station.name,
                station.capacity,
                station.grants,
                station.mean_wait,
                station.max_wait,
                station.peak_queue,
                100.0 * station.utilization
            )?;
        }
        Ok(())
    }
}

/// Aggregate over several replications of the same line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicationSummary {
    pub replications: usize,
    pub completed: usize,
    pub incomplete: usize,
    pub mean_lead_time: Option<f64>,
    pub mean_efficiency: Option<f64>,
    pub min_efficiency: Option<f64>,
    pub max_efficiency: Option<f64>,
}

impl ReplicationSummary {
    pub fn from_reports(reports: &[LineReport]) -> Self {
        let efficiencies: Vec<f64> = reports.iter().filter_map(LineReport::efficiency).collect();
        let leads: Vec<f64> = reports.iter().filter_map(LineReport::mean_lead_time).collect();

        Self {
            replications: reports.len(),
            completed: reports.iter().map(LineReport::completed).sum(),
            incomplete: reports.iter().map(|r| r.incomplete).sum(),
            mean_lead_time: mean(&leads),
            mean_efficiency: mean(&efficiencies),
            min_efficiency: efficiencies.iter().copied().reduce(f64::min),
            max_efficiency: efficiencies.iter().copied().reduce(f64::max),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl fmt::Display for ReplicationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Replications: {}", self.replications)?;
        writeln!(
            f,
            "Items completed: {}  incomplete: {}",
            self.completed, self.incomplete
        )?;
        writeln!(f, "Mean lead time: {}", or_dash(self.mean_lead_time, " min"))?;
        writeln!(
            f,
            "Value-added / lead time: mean {}  min {}  max {}",
            or_dash(self.mean_efficiency, "%"),
            or_dash(self.min_efficiency, "%"),
            or_dash(self.max_efficiency, "%")
        )
    }
}
