//! Driver boundary.
//!
//! Adapters talk to hardware only through these traits. Transports (serial, VISA,
//! vendor SDKs) live in the implementations; errors come back as `anyhow::Error` and the
//! adapters turn them into step failures.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::error::StepFailure;

/// Single motorised stage.
#[async_trait]
pub trait StageDriver: Send + Sync {
    /// Move to an absolute position.
    async fn move_abs(&self, target: f64) -> Result<()>;

    /// Current position.
    async fn position(&self) -> Result<f64>;

    /// Block until the last move has settled.
    async fn wait_settled(&self) -> Result<()>;

    /// Run the homing sequence.
    async fn home(&self) -> Result<()>;
}

/// Oscilloscope-class reader.
#[async_trait]
pub trait ScopeDriver: Send + Sync {
    /// Select the acquisition mode.
    async fn set_acquisition_mode(&self, mode: AcquisitionMode) -> Result<()>;

    /// Number of waveforms averaged in `AVE` mode.
    async fn set_number_averages(&self, averages: u32) -> Result<()>;

    /// Start or stop acquisition.
    async fn set_acquisition_state(&self, state: AcquisitionState) -> Result<()>;

    /// Fetch one channel as (time, voltage) samples.
    async fn get_data(&self, channel: u8) -> Result<(Vec<f64>, Vec<f64>)>;

    /// Raw acquisition settings reply.
    async fn query_acquisition(&self) -> Result<String>;

    /// Horizontal record length in samples.
    async fn record_length(&self) -> Result<usize>;
}

/// Oscilloscope acquisition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// `SAM`
    Sample,
    /// `PEAK`
    PeakDetect,
    /// `HIR`
    HiRes,
    /// `AVE`
    Average,
    /// `ENV`
    Envelope,
}

impl AcquisitionMode {
    /// Instrument mnemonic.
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionMode::Sample => "SAM",
            AcquisitionMode::PeakDetect => "PEAK",
            AcquisitionMode::HiRes => "HIR",
            AcquisitionMode::Average => "AVE",
            AcquisitionMode::Envelope => "ENV",
        }
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcquisitionMode {
    type Err = StepFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SAM" => Ok(AcquisitionMode::Sample),
            "PEAK" => Ok(AcquisitionMode::PeakDetect),
            "HIR" => Ok(AcquisitionMode::HiRes),
            "AVE" => Ok(AcquisitionMode::Average),
            "ENV" => Ok(AcquisitionMode::Envelope),
            _ => Err(StepFailure::MalformedAction(format!(
                "Unknown acquisition mode '{s}'. Must be one of: SAM, PEAK, HIR, AVE, ENV"
            ))),
        }
    }
}

/// Oscilloscope acquisition state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    /// `OFF`
    Off,
    /// `STOP`
    Stop,
    /// `ON`
    On,
    /// `RUN`
    Run,
}

impl AcquisitionState {
    /// Instrument mnemonic.
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionState::Off => "OFF",
            AcquisitionState::Stop => "STOP",
            AcquisitionState::On => "ON",
            AcquisitionState::Run => "RUN",
        }
    }

    /// True if the scope is acquiring.
    pub fn is_running(&self) -> bool {
        matches!(self, AcquisitionState::On | AcquisitionState::Run)
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcquisitionState {
    type Err = StepFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OFF" => Ok(AcquisitionState::Off),
            "STOP" => Ok(AcquisitionState::Stop),
            "ON" => Ok(AcquisitionState::On),
            "RUN" => Ok(AcquisitionState::Run),
            _ => Err(StepFailure::MalformedAction(format!(
                "Unknown acquisition state '{s}'. Must be one of: OFF, STOP, ON, RUN"
            ))),
        }
    }
}
