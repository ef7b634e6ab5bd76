//! Configuration for a production line run.
//!
//! Everything the line needs is carried in one immutable [`LineConfig`]
//! that is validated once, before any simulated time passes. Configs can be
//! built in code with the `with_*` methods or loaded from JSON; missing JSON
//! fields fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// How independent replications are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    /// Replications run one after another on the calling thread
    Sequential,
    /// Replications are spread over the Rayon thread pool
    Rayon,
}

impl Default for ConcurrencyMode {
    fn default() -> Self {
        ConcurrencyMode::Sequential
    }
}

/// Minutes spent in each stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageDurations {
    pub intake: f64,
    pub assembly: f64,
    pub transport: f64,
    pub inspection: f64,
    pub packaging: f64,
}

impl StageDurations {
    fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("intake", self.intake),
            ("assembly", self.assembly),
            ("transport", self.transport),
            ("inspection", self.inspection),
            ("packaging", self.packaging),
        ]
    }
}

impl Default for StageDurations {
    fn default() -> Self {
        Self {
            intake: 3.0,
            assembly: 5.0,
            transport: 2.0,
            inspection: 3.0,
            packaging: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationCapacities {
    pub assembly: usize,
    pub inspection: usize,
    pub packaging: usize,
}

impl Default for StationCapacities {
    fn default() -> Self {
        Self {
            assembly: 1,
            inspection: 1,
            packaging: 1,
        }
    }
}

/// Configuration for one line simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    pub durations: StageDurations,
    /// Probability that an item fails inspection and goes back to assembly
    pub failure_rate: f64,
    pub capacities: StationCapacities,
    /// Number of items fed into the line
    pub item_count: usize,
    /// Minutes between consecutive arrivals; zero means all arrive at t=0
    pub arrival_interval: f64,
    pub seed: u64,
    /// Simulated minutes to run; `None` runs until every item is done
    pub time_limit: Option<f64>,
    /// Independent runs with seeds `seed`, `seed + 1`, ...
    pub replications: usize,
    pub concurrency_mode: ConcurrencyMode,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            durations: StageDurations::default(),
            failure_rate: 0.2,
            capacities: StationCapacities::default(),
            item_count: 20,
            arrival_interval: 1.0,
            seed: 42,
            time_limit: Some(100.0),
            replications: 1,
            concurrency_mode: ConcurrencyMode::default(),
        }
    }
}

impl LineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_durations(mut self, durations: StageDurations) -> Self {
        self.durations = durations;
        self
    }

    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate;
        self
    }

    pub fn with_capacities(mut self, capacities: StationCapacities) -> Self {
        self.capacities = capacities;
        self
    }

    pub fn with_item_count(mut self, item_count: usize) -> Self {
        self.item_count = item_count;
        self
    }

    pub fn with_arrival_interval(mut self, minutes: f64) -> Self {
        self.arrival_interval = minutes;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_time_limit(mut self, minutes: Option<f64>) -> Self {
        self.time_limit = minutes;
        self
    }

    pub fn with_replications(mut self, replications: usize) -> Self {
        self.replications = replications;
        self
    }

    pub fn with_concurrency(mut self, mode: ConcurrencyMode) -> Self {
        self.concurrency_mode = mode;
        self
    }

    /// Check every value the line depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (stage, value) in self.durations.named() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidDuration { stage, value });
            }
        }

        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(ConfigError::InvalidFailureRate(self.failure_rate));
        }

        for (station, capacity) in [
            ("assembly", self.capacities.assembly),
            ("inspection", self.capacities.inspection),
            ("packaging", self.capacities.packaging),
        ] {
            if capacity == 0 {
                return Err(ConfigError::ZeroCapacity { station });
            }
        }

        if self.item_count == 0 {
            return Err(ConfigError::NoItems);
        }

        if !(self.arrival_interval.is_finite() && self.arrival_interval >= 0.0) {
            return Err(ConfigError::InvalidArrivalInterval(self.arrival_interval));
        }

        if let Some(limit) = self.time_limit {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(ConfigError::InvalidTimeLimit(limit));
            }
        }

        if self.replications == 0 {
            return Err(ConfigError::NoReplications);
        }

        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: LineConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }
}

/// Rejected configuration values
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidDuration { stage: &'static str, value: f64 },
    InvalidFailureRate(f64),
    ZeroCapacity { station: &'static str },
    NoItems,
    InvalidArrivalInterval(f64),
    InvalidTimeLimit(f64),
    NoReplications,
    Io { path: String, message: String },
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidDuration { stage, value } => write!(
                f,
                "Duration for stage '{}' must be a non-negative number of minutes, got {}",
                stage, value
            ),
            ConfigError::InvalidFailureRate(rate) => {
                write!(f, "Failure rate must lie in [0, 1], got {}", rate)
            }
            ConfigError::ZeroCapacity { station } => {
                write!(f, "Station '{}' needs a capacity of at least 1", station)
            }
            ConfigError::NoItems => write!(f, "Item count must be at least 1"),
            ConfigError::InvalidArrivalInterval(interval) => write!(
                f,
                "Arrival interval must be a non-negative number of minutes, got {}",
                interval
            ),
            ConfigError::InvalidTimeLimit(limit) => {
                write!(f, "Time limit must be positive, got {}", limit)
            }
            ConfigError::NoReplications => write!(f, "At least one replication is required"),
            ConfigError::Io { path, message } => {
                write!(f, "Cannot read config '{}': {}", path, message)
            }
            ConfigError::Parse(message) => write!(f, "Invalid config JSON: {}", message),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LineConfig::default();
        assert_eq!(config.item_count, 20);
        assert_eq!(config.failure_rate, 0.2);
        assert_eq!(config.seed, 42);
        assert_eq!(config.time_limit, Some(100.0));
        assert_eq!(config.capacities, StationCapacities::default());
        assert_eq!(config.concurrency_mode, ConcurrencyMode::Sequential);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = LineConfig::new()
            .with_item_count(5)
            .with_failure_rate(0.0)
            .with_seed(7)
            .with_time_limit(None)
            .with_replications(4)
            .with_concurrency(ConcurrencyMode::Rayon);

        assert_eq!(config.item_count, 5);
        assert_eq!(config.failure_rate, 0.0);
        assert_eq!(config.seed, 7);
        assert_eq!(config.time_limit, None);
        assert_eq!(config.replications, 4);
        assert_eq!(config.concurrency_mode, ConcurrencyMode::Rayon);
    }

    #[test]
    fn test_validation_errors() {
        let negative = LineConfig::new().with_durations(StageDurations {
            transport: -1.0,
            ..StageDurations::default()
        });
        assert_eq!(
            negative.validate(),
            Err(ConfigError::InvalidDuration {
                stage: "transport",
                value: -1.0
            })
        );

        assert_eq!(
            LineConfig::new().with_failure_rate(1.5).validate(),
            Err(ConfigError::InvalidFailureRate(1.5))
        );

        let zero = LineConfig::new().with_capacities(StationCapacities {
            inspection: 0,
            ..StationCapacities::default()
        });
        assert_eq!(
            zero.validate(),
            Err(ConfigError::ZeroCapacity {
                station: "inspection"
            })
        );

        assert_eq!(
            LineConfig::new().with_item_count(0).validate(),
            Err(ConfigError::NoItems)
        );
        assert_eq!(
            LineConfig::new().with_arrival_interval(-1.0).validate(),
            Err(ConfigError::InvalidArrivalInterval(-1.0))
        );
        assert_eq!(
            LineConfig::new().with_time_limit(Some(0.0)).validate(),
            Err(ConfigError::InvalidTimeLimit(0.0))
        );
        assert_eq!(
            LineConfig::new().with_replications(0).validate(),
            Err(ConfigError::NoReplications)
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = LineConfig::from_json_str(
            r#"{ "item_count": 3, "durations": { "assembly": 4.0 }, "concurrency_mode": "rayon" }"#,
        )
        .unwrap();

        assert_eq!(config.item_count, 3);
        assert_eq!(config.durations.assembly, 4.0);
        assert_eq!(config.durations.intake, 3.0);
        assert_eq!(config.failure_rate, 0.2);
        assert_eq!(config.concurrency_mode, ConcurrencyMode::Rayon);
    }

    #[test]
    fn test_json_is_validated() {
        assert_eq!(
            LineConfig::from_json_str(r#"{ "failure_rate": -0.5 }"#),
            Err(ConfigError::InvalidFailureRate(-0.5))
        );
        assert!(matches!(
            LineConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            LineConfig::from_json_file("/nonexistent/line.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
