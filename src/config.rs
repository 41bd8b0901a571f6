//! Driver configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, optional)
//! 2. environment variables prefixed with `NI4050_`, nested keys separated
//!    by `__` (e.g. `NI4050_POLLING__ADC_READY_MAX_POLLS=200`)
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration.
//!
//! # Example
//! ```no_run
//! use ni4050::config::DriverConfig;
//!
//! let config = DriverConfig::load_from("config/ni4050.toml")?;
//! config.validate()?;
//! println!("ADC ready limit: {}", config.polling.adc_ready_max_polls);
//! # Ok::<(), ni4050::DmmError>(())
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationArea, CalibrationReader, ResistanceBounds};
use crate::dispatcher::Dispatcher;
use crate::error::{DmmError, Result};
use crate::logging::LogFormat;
use crate::poll::{PollLimits, ReadyPoller};
use crate::range::ProfileTable;
use crate::sequencer::AdcSequencer;

/// Top-level driver configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Readiness polling
    pub polling: PollingConfig,
    /// Attached-unit registry
    pub units: UnitsConfig,
    /// Calibration store access
    pub calibration: CalibrationConfig,
    /// Log output
    pub logging: LoggingConfig,
}

/// Readiness polling limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Polls of the ADC-ready bit before a register write times out
    pub adc_ready_max_polls: u32,
    /// Polls of the new-data bit before an acquisition times out
    pub data_ready_max_polls: u32,
    /// Sleep between polls in milliseconds
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        let limits = PollLimits::default();
        Self {
            adc_ready_max_polls: limits.adc_ready,
            data_ready_max_polls: limits.data_ready,
            interval_ms: 1,
        }
    }
}

/// Unit registry sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitsConfig {
    /// Maximum number of concurrently attached units
    pub max_units: usize,
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self { max_units: 4 }
    }
}

/// Calibration store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Which calibration area to read constants from
    pub area: CalibrationArea,
    /// Lowest accepted internal resistance (ohms)
    pub resistance_min_ohms: u32,
    /// Highest accepted internal resistance (ohms)
    pub resistance_max_ohms: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let bounds = ResistanceBounds::default();
        Self {
            area: CalibrationArea::default(),
            resistance_min_ohms: bounds.min,
            resistance_max_ohms: bounds.max,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl DriverConfig {
    /// Load configuration from `path` (if it exists) and the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("NI4050_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Load configuration from the environment only.
    pub fn from_env() -> Result<Self> {
        let config = Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("NI4050_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(DmmError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        if self.polling.adc_ready_max_polls == 0 || self.polling.data_ready_max_polls == 0 {
            return Err(DmmError::Config(
                "Poll limits must be greater than zero".to_string(),
            ));
        }

        if self.polling.data_ready_max_polls <= self.polling.adc_ready_max_polls {
            return Err(DmmError::Config(format!(
                "data_ready_max_polls ({}) must exceed adc_ready_max_polls ({})",
                self.polling.data_ready_max_polls, self.polling.adc_ready_max_polls
            )));
        }

        if self.units.max_units == 0 {
            return Err(DmmError::Config("max_units must be at least 1".to_string()));
        }

        if self.calibration.resistance_min_ohms > self.calibration.resistance_max_ohms {
            return Err(DmmError::Config(format!(
                "resistance_min_ohms ({}) exceeds resistance_max_ohms ({})",
                self.calibration.resistance_min_ohms, self.calibration.resistance_max_ohms
            )));
        }

        Ok(())
    }

    /// Poll limits derived from this configuration.
    pub fn poll_limits(&self) -> PollLimits {
        PollLimits {
            adc_ready: self.polling.adc_ready_max_polls,
            data_ready: self.polling.data_ready_max_polls,
        }
    }

    /// Calibration reader derived from this configuration.
    pub fn calibration_reader(&self) -> CalibrationReader {
        CalibrationReader::new(
            self.calibration.area,
            ResistanceBounds {
                min: self.calibration.resistance_min_ohms,
                max: self.calibration.resistance_max_ohms,
            },
        )
    }

    /// Sequencer using `poller` for its readiness waits.
    pub fn sequencer_with(&self, poller: ReadyPoller) -> AdcSequencer {
        AdcSequencer::new(
            Arc::new(ProfileTable::standard()),
            self.calibration_reader(),
            poller,
            self.poll_limits(),
        )
    }

    /// Sequencer sleeping on the calling thread between polls.
    pub fn sequencer(&self) -> AdcSequencer {
        self.sequencer_with(ReadyPoller::new(Duration::from_millis(self.polling.interval_ms)))
    }

    /// Dispatcher sized for `units.max_units`.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.sequencer(), self.units.max_units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = DriverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.polling.adc_ready_max_polls, 100);
        assert_eq!(config.polling.data_ready_max_polls, 250);
        assert_eq!(config.units.max_units, 4);
        assert_eq!(config.calibration.area, CalibrationArea::Load);
        assert_eq!(config.calibration.resistance_min_ohms, 800_000);
        assert_eq!(config.calibration.resistance_max_ohms, 1_200_000);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[polling]\nadc_ready_max_polls = 20\n\n[calibration]\narea = \"factory\"\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let config = DriverConfig::load_from(file.path()).unwrap();
        assert_eq!(config.polling.adc_ready_max_polls, 20);
        assert_eq!(config.polling.data_ready_max_polls, 250);
        assert_eq!(config.calibration.area, CalibrationArea::Factory);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.units.max_units, 4);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DriverConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.polling, PollingConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = DriverConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = DriverConfig::default();
        config.polling.data_ready_max_polls = config.polling.adc_ready_max_polls;
        assert!(config.validate().is_err());

        let mut config = DriverConfig::default();
        config.polling.adc_ready_max_polls = 0;
        assert!(config.validate().is_err());

        let mut config = DriverConfig::default();
        config.units.max_units = 0;
        assert!(config.validate().is_err());

        let mut config = DriverConfig::default();
        config.calibration.resistance_min_ohms = 2_000_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wider_resistance_window_is_configurable() {
        let mut config = DriverConfig::default();
        config.calibration.resistance_min_ohms = 640_000;
        config.calibration.resistance_max_ohms = 1_440_000;
        let bounds = config.calibration_reader().bounds();
        assert!(bounds.contains(700_000));
        assert!(bounds.contains(1_300_000));
    }
}
