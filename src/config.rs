//! Configuration System using Figment
//!
//! Strongly-typed configuration for a scan run. Configuration is loaded from:
//! 1. a TOML file (base configuration, default `config/scan.toml`)
//! 2. environment variables prefixed with `SCANDAQ_`, key path separated by `__`
//!
//! # Environment Variable Overrides
//!
//! ```text
//! SCANDAQ_APPLICATION__LOG_LEVEL=debug
//! SCANDAQ_SCAN__SETTLE_TIME=1.0
//! SCANDAQ_RUN__FAILURE_POLICY=abort_on_move_failure
//! ```
//!
//! # Example
//!
//! ```no_run
//! use scan_daq::config::AppConfig;
//!
//! let config = AppConfig::load_from("config/scan.toml")?;
//! println!("Experiment: {}", config.application.name);
//! println!("Axes: {:?}", config.scan.axes);
//! # Ok::<(), scan_daq::error::ScanError>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::action::SYSTEM_INSTRUMENT;
use crate::engine::FailurePolicy;
use crate::error::{ScanError, ScanResult};
use crate::scan::{Axis, ScanConfig};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/scan.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Sweep description
    pub scan: ScanConfig,
    /// Execution settings
    #[serde(default)]
    pub run: RunConfig,
    /// Instrument definitions
    #[serde(default)]
    pub instruments: Vec<InstrumentDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Experiment name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Execution loop configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// What to do after a failed step
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// Instrument class of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentType {
    /// Motorised stage controller with named sub-stages
    MotionStage,
    /// Oscilloscope-class reader
    Oscilloscope,
}

/// Instrument definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentDefinition {
    /// Unique instrument name, referenced by actions
    pub name: String,
    /// Instrument class
    pub r#type: InstrumentType,
    /// Hardware model, e.g. "Tektronix_DPO4102B"
    #[serde(default)]
    pub model: Option<String>,
    /// Connection address (IP address, serial port, VISA resource)
    #[serde(default)]
    pub address: Option<String>,
    /// Home every sub-stage before the run (MotionStage only)
    #[serde(default)]
    pub home_stages: bool,
    /// Sub-stages (MotionStage only)
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
    /// Samples per waveform (Oscilloscope only)
    #[serde(default = "default_record_length")]
    pub record_length: usize,
}

/// Kind of motion a sub-stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Translation stage
    Linear,
    /// Rotation mount
    Rotational,
}

/// Sub-stage of a motion-stage instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Sub-stage name, e.g. "X-Stage"
    pub name: String,
    /// Motion kind
    pub kind: StageKind,
    /// Controller serial number
    #[serde(default)]
    pub serial: String,
    /// Axis served by this sub-stage
    pub axis: Axis,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_record_length() -> usize {
    10_000
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl AppConfig {
    /// Load configuration from the default location and environment variables.
    ///
    /// # Errors
    ///
    /// See [`load_from`](Self::load_from).
    pub fn load() -> ScanResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path, then environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Configuration`] if `path` does not exist or validation fails,
    /// and [`ScanError::Config`] if the sources cannot be merged or deserialized.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ScanResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ScanError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let config: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SCANDAQ_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string, without environment overrides.
    ///
    /// # Errors
    ///
    /// Same as [`load_from`](Self::load_from).
    pub fn from_toml_str(toml: &str) -> ScanResult<Self> {
        let config: Self = Figment::new().merge(Toml::string(toml)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - The scan configuration is valid
    /// - Instrument names are unique and none is named `SYSTEM`
    /// - Motion stages have uniquely named sub-stages, at most one per linear axis
    /// - The scan's stage and reader instruments exist and have the right type
    /// - Every swept axis has a `<axis>-Stage` sub-stage on the stage instrument
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Configuration`] describing the first violation.
    pub fn validate(&self) -> ScanResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ScanError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        self.scan.validate()?;

        let mut names = HashSet::new();
        for instrument in &self.instruments {
            if instrument.name == SYSTEM_INSTRUMENT {
                return Err(ScanError::Configuration(format!(
                    "Instrument name '{SYSTEM_INSTRUMENT}' is reserved"
                )));
            }
            if !names.insert(instrument.name.as_str()) {
                return Err(ScanError::Configuration(format!(
                    "Duplicate instrument name: '{}'",
                    instrument.name
                )));
            }
            self.validate_instrument(instrument)?;
        }

        let stage = self.expect_instrument(&self.scan.stage_instrument, InstrumentType::MotionStage)?;
        self.expect_instrument(&self.scan.reader_instrument, InstrumentType::Oscilloscope)?;
        for axis in &self.scan.axes {
            let stage_name = axis.stage_name();
            if !stage.stages.iter().any(|s| s.name == stage_name) {
                return Err(ScanError::Configuration(format!(
                    "Stage instrument '{}' has no sub-stage '{}' for axis {}",
                    stage.name, stage_name, axis
                )));
            }
        }

        Ok(())
    }

    fn validate_instrument(&self, instrument: &InstrumentDefinition) -> ScanResult<()> {
        match instrument.r#type {
            InstrumentType::MotionStage => {
                if instrument.stages.is_empty() {
                    return Err(ScanError::Configuration(format!(
                        "MotionStage instrument '{}' has no stages",
                        instrument.name
                    )));
                }
                let mut stage_names = HashSet::new();
                let mut linear_axes = HashSet::new();
                for stage in &instrument.stages {
                    if !stage_names.insert(stage.name.as_str()) {
                        return Err(ScanError::Configuration(format!(
                            "MotionStage instrument '{}': duplicate stage '{}'",
                            instrument.name, stage.name
                        )));
                    }
                    match (stage.kind, stage.axis.is_linear()) {
                        (StageKind::Linear, true) => {
                            if !linear_axes.insert(stage.axis) {
                                return Err(ScanError::Configuration(format!(
                                    "MotionStage instrument '{}': more than one stage on axis {}",
                                    instrument.name, stage.axis
                                )));
                            }
                        }
                        (StageKind::Rotational, false) => {}
                        (kind, _) => {
                            return Err(ScanError::Configuration(format!(
                                "MotionStage instrument '{}': stage '{}' is {:?} but serves axis {}",
                                instrument.name, stage.name, kind, stage.axis
                            )));
                        }
                    }
                }
            }
            InstrumentType::Oscilloscope => {
                if instrument.record_length == 0 {
                    return Err(ScanError::Configuration(format!(
                        "Oscilloscope instrument '{}': 'record_length' must be > 0",
                        instrument.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn expect_instrument(
        &self,
        name: &str,
        expected: InstrumentType,
    ) -> ScanResult<&InstrumentDefinition> {
        let instrument = self
            .instruments
            .iter()
            .find(|inst| inst.name == name)
            .ok_or_else(|| ScanError::UnknownInstrument(name.to_string()))?;
        if instrument.r#type != expected {
            return Err(ScanError::Configuration(format!(
                "Instrument '{}' is a {:?}, expected {:?}",
                name, instrument.r#type, expected
            )));
        }
        Ok(instrument)
    }

    /// Instruments of a specific type
    pub fn instruments_by_type(&self, instrument_type: InstrumentType) -> Vec<&InstrumentDefinition> {
        self.instruments
            .iter()
            .filter(|inst| inst.r#type == instrument_type)
            .collect()
    }
}
