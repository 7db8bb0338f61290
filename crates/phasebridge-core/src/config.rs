//! Configuration loading and typed config structures for PhaseBridge.
//!
//! The canonical configuration lives in `phasebridge-config.yaml` at the
//! project root. This module defines strongly-typed structs that mirror the
//! YAML structure, and provides a loader that reads and validates the file.

use std::path::{Path, PathBuf};

use phasebridge_types::RecordType;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but a value is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `phasebridge-config.yaml`. Every field has a
/// default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Session timing and scope.
    #[serde(default)]
    pub simulation: SessionConfig,

    /// Periodic outbound records.
    #[serde(default = "default_publish")]
    pub publish: Vec<PublishConfig>,

    /// Messaging connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Road network description.
    #[serde(default)]
    pub topology: TopologyConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// The `NATS_URL` environment variable overrides `connection.nats_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml reads an empty document as a unit value.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.connection.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.step_length <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                reason: "simulation.step_length must be positive".to_owned(),
            });
        }
        if self.simulation.warm_up_time < Decimal::ZERO {
            return Err(ConfigError::Invalid {
                reason: "simulation.warm_up_time must not be negative".to_owned(),
            });
        }
        if self
            .simulation
            .time_limit
            .is_some_and(|limit| limit <= Decimal::ZERO)
        {
            return Err(ConfigError::Invalid {
                reason: "simulation.time_limit must be positive when set".to_owned(),
            });
        }
        if let Some(bad) = self.publish.iter().find(|p| p.frequency < Decimal::ZERO) {
            return Err(ConfigError::Invalid {
                reason: format!("publish frequency of {} must not be negative", bad.name),
            });
        }
        if self.connection.inbound_queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "connection.inbound_queue_capacity must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    /// Publishing period of `record_type`, or `None` when it is not
    /// published periodically (absent or frequency 0).
    pub fn publish_period(&self, record_type: RecordType) -> Option<Decimal> {
        self.publish
            .iter()
            .find(|p| p.name == record_type)
            .map(|p| p.frequency)
            .filter(|f| *f > Decimal::ZERO)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation: SessionConfig::default(),
            publish: default_publish(),
            connection: ConnectionConfig::default(),
            logging: LoggingConfig::default(),
            topology: TopologyConfig::default(),
        }
    }
}

/// Session timing and scope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Engine step length in simulated seconds.
    #[serde(default = "default_step_length")]
    pub step_length: Decimal,

    /// Simulated time at which the session ends; unlimited when absent.
    #[serde(default)]
    pub time_limit: Option<Decimal>,

    /// Simulated seconds before any record is published.
    #[serde(default)]
    pub warm_up_time: Decimal,

    /// Real-time milliseconds between steps (0 = as fast as possible).
    #[serde(default)]
    pub step_interval_ms: u64,

    /// Junction ids to control; every signalized junction when empty.
    #[serde(default)]
    pub junction_region: Vec<String>,

    /// Whether the session waits for a `Start` record before stepping.
    #[serde(default)]
    pub await_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            step_length: default_step_length(),
            time_limit: None,
            warm_up_time: Decimal::ZERO,
            step_interval_ms: 0,
            junction_region: Vec::new(),
            await_start: false,
        }
    }
}

/// One periodic outbound record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishConfig {
    /// Record type to publish.
    pub name: RecordType,

    /// Period in simulated seconds; 0 disables.
    #[serde(default)]
    pub frequency: Decimal,
}

/// Messaging connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    /// NATS messaging URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// First subject segment of every channel.
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// Region segment of every channel.
    #[serde(default = "default_region")]
    pub region: u32,

    /// Capacity of each per-record-type inbound queue.
    #[serde(default = "default_inbound_queue_capacity")]
    pub inbound_queue_capacity: usize,
}

impl ConnectionConfig {
    /// Override connection settings with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NATS_URL") {
            self.nats_url = val;
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            subject_prefix: default_subject_prefix(),
            region: default_region(),
            inbound_queue_capacity: default_inbound_queue_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Road network description.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TopologyConfig {
    /// Path of the topology file, relative to the working directory.
    #[serde(default = "default_topology_path")]
    pub path: PathBuf,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            path: default_topology_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_step_length() -> Decimal {
    Decimal::ONE
}

fn default_publish() -> Vec<PublishConfig> {
    vec![
        PublishConfig {
            name: RecordType::SignalScheme,
            frequency: Decimal::ZERO,
        },
        PublishConfig {
            name: RecordType::SignalExecution,
            frequency: Decimal::ONE,
        },
    ]
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_subject_prefix() -> String {
    "phasebridge".to_owned()
}

const fn default_region() -> u32 {
    1
}

const fn default_inbound_queue_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_topology_path() -> PathBuf {
    PathBuf::from("topology.yaml")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.step_length, dec!(1));
        assert_eq!(config.connection.inbound_queue_capacity, 1024);
        assert_eq!(config.publish_period(RecordType::SignalExecution), Some(dec!(1)));
        assert_eq!(config.publish_period(RecordType::SignalScheme), None);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
simulation:
  step_length: 0.5
  time_limit: 3600
  warm_up_time: 300
  step_interval_ms: 100
  junction_region: ["J1", "J2"]
  await_start: true

publish:
  - name: SignalScheme
    frequency: 60
  - name: SignalExecution
    frequency: 0

connection:
  nats_url: "nats://testhost:4222"
  subject_prefix: "city"
  region: 3
  inbound_queue_capacity: 16

logging:
  level: "debug"
  json: true

topology:
  path: "nets/grid.yaml"
"#;

        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.simulation.step_length, dec!(0.5));
        assert_eq!(config.simulation.time_limit, Some(dec!(3600)));
        assert_eq!(config.simulation.warm_up_time, dec!(300));
        assert_eq!(config.simulation.junction_region.len(), 2);
        assert!(config.simulation.await_start);
        assert_eq!(config.publish_period(RecordType::SignalScheme), Some(dec!(60)));
        assert_eq!(config.publish_period(RecordType::SignalExecution), None);
        assert_eq!(config.connection.subject_prefix, "city");
        assert_eq!(config.connection.region, 3);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.topology.path, PathBuf::from("nets/grid.yaml"));
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = SimulationConfig::parse("simulation:\n  step_length: 0.1\n").unwrap();
        assert_eq!(config.simulation.step_length, dec!(0.1));
        assert_eq!(config.simulation.time_limit, None);
        assert_eq!(config.publish.len(), 2);
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(SimulationConfig::parse("").is_ok());
    }

    #[test]
    fn rejects_non_positive_step_length() {
        let err = SimulationConfig::parse("simulation:\n  step_length: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_negative_frequency() {
        let yaml = "publish:\n  - name: SignalScheme\n    frequency: -1\n";
        assert!(SimulationConfig::parse(yaml).is_err());
    }

    #[test]
    fn rejects_unknown_record_type() {
        let yaml = "publish:\n  - name: TrafficFlow\n    frequency: 5\n";
        assert!(matches!(
            SimulationConfig::parse(yaml),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("phasebridge-config.yaml");
        if path.exists() {
            let config = SimulationConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
