//! Declarative sweep description.
//!
//! A [`ScanConfig`] names the axes to sweep (first = major axis), the start/stop
//! coordinates and step sizes as X/Y/Z triples, the stage and reader instruments and the
//! timing of the sweep. [`ScanConfig::validate`] enforces every structural invariant the
//! compiler relies on, so a config that validates always compiles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ScanError, ScanResult};

use super::compiler::checked_plan_len;

/// One controllable degree of motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Linear X.
    X,
    /// Linear Y.
    Y,
    /// Linear Z.
    Z,
    /// Rotational. Has no coordinate index and cannot be swept.
    R,
}

impl Axis {
    /// Index of this axis in a coordinate triple.
    pub fn index(&self) -> Option<usize> {
        match self {
            Axis::X => Some(0),
            Axis::Y => Some(1),
            Axis::Z => Some(2),
            Axis::R => None,
        }
    }

    /// Single-letter label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::R => "R",
        }
    }

    /// Name of the sub-stage that drives this axis, e.g. `X-Stage`.
    pub fn stage_name(&self) -> String {
        format!("{}-Stage", self.as_str())
    }

    /// True for the linear axes.
    pub fn is_linear(&self) -> bool {
        self.index().is_some()
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "X" => Ok(Axis::X),
            "Y" => Ok(Axis::Y),
            "Z" => Ok(Axis::Z),
            "R" => Ok(Axis::R),
            other => Err(ScanError::Configuration(format!(
                "Unknown axis '{other}'. Must be one of: X, Y, Z, R"
            ))),
        }
    }
}

/// Scan dimensionality tag carried by configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanKind {
    /// One swept axis.
    #[serde(rename = "1DScan")]
    OneD,
    /// Two swept axes.
    #[serde(rename = "2DScan")]
    TwoD,
    /// Three swept axes.
    #[serde(rename = "3DScan")]
    ThreeD,
}

impl ScanKind {
    /// Number of axes this kind sweeps.
    pub fn axis_count(&self) -> usize {
        match self {
            ScanKind::OneD => 1,
            ScanKind::TwoD => 2,
            ScanKind::ThreeD => 3,
        }
    }
}

/// Sweep configuration consumed by [`compile`](crate::scan::compile).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Optional dimensionality tag; must agree with `axes` when present.
    #[serde(default)]
    pub kind: Option<ScanKind>,
    /// Swept axes, outermost (slowest varying) first.
    pub axes: Vec<Axis>,
    /// Start coordinates, indexed X/Y/Z.
    pub start_coords: [f64; 3],
    /// Stop coordinates, indexed X/Y/Z.
    pub stop_coords: [f64; 3],
    /// Step sizes, indexed X/Y/Z.
    pub step_size: [f64; 3],
    /// Motion-stage instrument that moves the sample.
    pub stage_instrument: String,
    /// Reader instrument triggered at every grid point.
    pub reader_instrument: String,
    /// Seconds to wait after every stage move.
    pub settle_time: f64,
    /// Fixed-point scale factor for coordinate arithmetic.
    pub resolution: u32,
    /// Reader channel fetched at every grid point.
    #[serde(default = "default_reader_channel")]
    pub reader_channel: i64,
    /// Seconds between stopping acquisition and fetching data.
    #[serde(default = "default_acquisition_settle")]
    pub acquisition_settle: f64,
}

fn default_reader_channel() -> i64 {
    2
}

fn default_acquisition_settle() -> f64 {
    0.5
}

impl ScanConfig {
    /// Config with the default reader channel and acquisition settle time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        axes: Vec<Axis>,
        start_coords: [f64; 3],
        stop_coords: [f64; 3],
        step_size: [f64; 3],
        stage_instrument: &str,
        reader_instrument: &str,
        settle_time: f64,
        resolution: u32,
    ) -> Self {
        Self {
            kind: None,
            axes,
            start_coords,
            stop_coords,
            step_size,
            stage_instrument: stage_instrument.to_string(),
            reader_instrument: reader_instrument.to_string(),
            settle_time,
            resolution,
            reader_channel: default_reader_channel(),
            acquisition_settle: default_acquisition_settle(),
        }
    }

    /// Check every invariant the compiler depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Configuration`] describing the first violation found.
    pub fn validate(&self) -> ScanResult<()> {
        if self.axes.is_empty() || self.axes.len() > 3 {
            return Err(ScanError::Configuration(format!(
                "A scan needs 1 to 3 axes, got {}",
                self.axes.len()
            )));
        }
        if let Some(kind) = self.kind {
            if kind.axis_count() != self.axes.len() {
                return Err(ScanError::Configuration(format!(
                    "Scan kind {:?} sweeps {} axes but {} were listed",
                    kind,
                    kind.axis_count(),
                    self.axes.len()
                )));
            }
        }
        if self.stage_instrument.is_empty() || self.reader_instrument.is_empty() {
            return Err(ScanError::Configuration(
                "Stage and reader instrument names cannot be empty".to_string(),
            ));
        }
        for (i, axis) in self.axes.iter().enumerate() {
            if self.axes[..i].contains(axis) {
                return Err(ScanError::Configuration(format!(
                    "Axis {axis} is listed more than once"
                )));
            }
            self.validate_axis(*axis)?;
        }
        for (label, seconds) in [
            ("settle_time", self.settle_time),
            ("acquisition_settle", self.acquisition_settle),
        ] {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(ScanError::Configuration(format!(
                    "{label} must be a non-negative number of seconds, got {seconds}"
                )));
            }
        }
        self.validate_resolution()?;
        checked_plan_len(self).map(|_| ())
    }

    fn validate_axis(&self, axis: Axis) -> ScanResult<()> {
        let Some(index) = axis.index() else {
            return Err(ScanError::Configuration(format!(
                "Axis {axis} has no coordinate index and cannot be swept"
            )));
        };
        let (start, stop, step) = (
            self.start_coords[index],
            self.stop_coords[index],
            self.step_size[index],
        );
        if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
            return Err(ScanError::Configuration(format!(
                "Axis {axis}: coordinates and step size must be finite"
            )));
        }
        if step == 0.0 {
            return Err(ScanError::Configuration(format!(
                "Axis {axis}: step size cannot be zero"
            )));
        }
        let span = stop - start;
        if span != 0.0 && span.signum() != step.signum() {
            return Err(ScanError::Configuration(format!(
                "Axis {axis}: step {step} moves away from stop {stop} (start {start})"
            )));
        }
        let limit = i64::MAX as f64 / 2.0;
        for value in [start, stop, step] {
            if (value * f64::from(self.resolution)).abs() >= limit {
                return Err(ScanError::Configuration(format!(
                    "Axis {axis}: {value} overflows the resolution {}",
                    self.resolution
                )));
            }
        }
        Ok(())
    }

    fn validate_resolution(&self) -> ScanResult<()> {
        let decimals = self
            .axes
            .iter()
            .filter_map(Axis::index)
            .map(|i| decimal_places(self.step_size[i]))
            .max()
            .unwrap_or(0);
        let required = 10_u64.checked_pow(decimals).unwrap_or(u64::MAX);
        if u64::from(self.resolution) <= required {
            return Err(ScanError::Configuration(format!(
                "Resolution {} must exceed 10^{} for the step sizes in use",
                self.resolution, decimals
            )));
        }
        Ok(())
    }
}

/// Decimal places in the shortest representation of `value`.
pub(crate) fn decimal_places(value: f64) -> u32 {
    let text = format!("{}", value.abs());
    text.split_once('.')
        .map_or(0, |(_, fraction)| fraction.len() as u32)
}
