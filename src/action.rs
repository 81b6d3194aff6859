//! Action value types.
//!
//! An [`Action`] is one request to one named instrument: the instrument name, an
//! [`ActionType`] tag from the fixed adapter vocabulary and an ordered list of
//! [`ActionParam`]s whose meaning is defined by the tag. Actions are immutable once
//! built; adapters read them through accessors and answer with an [`ExecutionResult`].
//!
//! # Parameter layouts
//!
//! | Action type | data |
//! |---|---|
//! | `Wait` | `[Float(seconds)]` |
//! | `MoveToCoords` | `[Coords([x, y, z])]` |
//! | `MoveStage` | `[Text(sub_stage), Float(position)]` |
//! | `SET_ACQ_MODE` | `[Text(mode), Int(averages)]` |
//! | `SET_ACQ_STATE` | `[Text(state)]` |
//! | `GET_DATA` | `[Int(channel)]` |
//! | `GET_ACQ_PARAMS` | `[]` |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ScanError, StepFailure};

/// Instrument name the System adapter is registered under.
pub const SYSTEM_INSTRUMENT: &str = "SYSTEM";

/// Action type vocabulary shared by all adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    /// Block for a number of seconds (System adapter).
    #[serde(rename = "Wait")]
    Wait,
    /// Move X/Y/Z sub-stages together to an absolute target.
    #[serde(rename = "MoveToCoords")]
    MoveToCoords,
    /// Move one named sub-stage to an absolute position.
    #[serde(rename = "MoveStage")]
    MoveStage,
    /// Configure oscilloscope acquisition mode and averaging.
    #[serde(rename = "SET_ACQ_MODE")]
    SetAcqMode,
    /// Start or stop oscilloscope acquisition.
    #[serde(rename = "SET_ACQ_STATE")]
    SetAcqState,
    /// Fetch one channel's waveform.
    #[serde(rename = "GET_DATA")]
    GetData,
    /// Query the current acquisition settings.
    #[serde(rename = "GET_ACQ_PARAMS")]
    GetAcqParams,
}

impl ActionType {
    /// Every action type, in vocabulary order.
    pub const ALL: [ActionType; 7] = [
        ActionType::Wait,
        ActionType::MoveToCoords,
        ActionType::MoveStage,
        ActionType::SetAcqMode,
        ActionType::SetAcqState,
        ActionType::GetData,
        ActionType::GetAcqParams,
    ];

    /// Wire tag used in plan listings and step records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Wait => "Wait",
            ActionType::MoveToCoords => "MoveToCoords",
            ActionType::MoveStage => "MoveStage",
            ActionType::SetAcqMode => "SET_ACQ_MODE",
            ActionType::SetAcqState => "SET_ACQ_STATE",
            ActionType::GetData => "GET_DATA",
            ActionType::GetAcqParams => "GET_ACQ_PARAMS",
        }
    }

    /// True for action types that move a stage.
    pub fn is_motion(&self) -> bool {
        matches!(self, ActionType::MoveToCoords | ActionType::MoveStage)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ScanError::Configuration(format!("Unknown action type '{s}'")))
    }
}

/// One opaque action parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionParam {
    /// Integer parameter (channel, averages).
    Int(i64),
    /// Floating point parameter (seconds, position).
    Float(f64),
    /// Text parameter (sub-stage name, mode, state).
    Text(String),
    /// Absolute X/Y/Z target.
    Coords([f64; 3]),
}

impl fmt::Display for ActionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionParam::Int(i) => write!(f, "{}", i),
            ActionParam::Float(x) => write!(f, "{}", x),
            ActionParam::Text(s) => write!(f, "'{}'", s),
            ActionParam::Coords(c) => write!(f, "[{}, {}, {}]", c[0], c[1], c[2]),
        }
    }
}

impl From<f64> for ActionParam {
    fn from(value: f64) -> Self {
        ActionParam::Float(value)
    }
}

impl From<i64> for ActionParam {
    fn from(value: i64) -> Self {
        ActionParam::Int(value)
    }
}

impl From<&str> for ActionParam {
    fn from(value: &str) -> Self {
        ActionParam::Text(value.to_string())
    }
}

impl From<[f64; 3]> for ActionParam {
    fn from(value: [f64; 3]) -> Self {
        ActionParam::Coords(value)
    }
}

/// An atomic instruction directed at one named instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    instrument: String,
    action_type: ActionType,
    data: Vec<ActionParam>,
}

impl Action {
    /// Build an action from its three parts.
    pub fn new(
        instrument: impl Into<String>,
        action_type: ActionType,
        data: Vec<ActionParam>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            action_type,
            data,
        }
    }

    /// `Wait` on the System adapter.
    pub fn wait(seconds: f64) -> Self {
        Self::new(SYSTEM_INSTRUMENT, ActionType::Wait, vec![seconds.into()])
    }

    /// `MoveStage` of one sub-stage on a motion-stage instrument.
    pub fn move_stage(instrument: &str, sub_stage: &str, position: f64) -> Self {
        Self::new(
            instrument,
            ActionType::MoveStage,
            vec![sub_stage.into(), position.into()],
        )
    }

    /// `MoveToCoords` on a motion-stage instrument.
    pub fn move_to_coords(instrument: &str, coords: [f64; 3]) -> Self {
        Self::new(instrument, ActionType::MoveToCoords, vec![coords.into()])
    }

    /// `SET_ACQ_MODE` on a reader.
    pub fn set_acq_mode(instrument: &str, mode: &str, averages: i64) -> Self {
        Self::new(
            instrument,
            ActionType::SetAcqMode,
            vec![mode.into(), averages.into()],
        )
    }

    /// `SET_ACQ_STATE` on a reader.
    pub fn set_acq_state(instrument: &str, state: &str) -> Self {
        Self::new(instrument, ActionType::SetAcqState, vec![state.into()])
    }

    /// `GET_DATA` for one reader channel.
    pub fn get_data(instrument: &str, channel: i64) -> Self {
        Self::new(instrument, ActionType::GetData, vec![channel.into()])
    }

    /// `GET_ACQ_PARAMS` on a reader.
    pub fn get_acq_params(instrument: &str) -> Self {
        Self::new(instrument, ActionType::GetAcqParams, Vec::new())
    }

    /// Target instrument name.
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Action type tag.
    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    /// Ordered parameters.
    pub fn data(&self) -> &[ActionParam] {
        &self.data
    }

    /// Parameter `index` as a float. Integers are widened.
    pub fn float_param(&self, index: usize) -> Result<f64, StepFailure> {
        match self.data.get(index) {
            Some(ActionParam::Float(x)) => Ok(*x),
            Some(ActionParam::Int(i)) => Ok(*i as f64),
            other => Err(self.param_error(index, "a number", other)),
        }
    }

    /// Parameter `index` as an integer.
    pub fn int_param(&self, index: usize) -> Result<i64, StepFailure> {
        match self.data.get(index) {
            Some(ActionParam::Int(i)) => Ok(*i),
            other => Err(self.param_error(index, "an integer", other)),
        }
    }

    /// Parameter `index` as text.
    pub fn text_param(&self, index: usize) -> Result<&str, StepFailure> {
        match self.data.get(index) {
            Some(ActionParam::Text(s)) => Ok(s),
            other => Err(self.param_error(index, "text", other)),
        }
    }

    /// Parameter `index` as an X/Y/Z triple.
    pub fn coords_param(&self, index: usize) -> Result<[f64; 3], StepFailure> {
        match self.data.get(index) {
            Some(ActionParam::Coords(c)) => Ok(*c),
            other => Err(self.param_error(index, "coordinates", other)),
        }
    }

    fn param_error(&self, index: usize, expected: &str, got: Option<&ActionParam>) -> StepFailure {
        let got = got.map_or_else(|| "nothing".to_string(), |p| p.to_string());
        StepFailure::MalformedAction(format!(
            "{} parameter {} must be {}, got {}",
            self.action_type, index, expected, got
        ))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Instrument:{},Action Type:{},Action Data:[",
            self.instrument, self.action_type
        )?;
        for (i, param) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str("]")
    }
}

/// One value of an execution payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PayloadValue {
    /// Position reached by a sub-stage.
    Position(f64),
    /// Independent (time) and dependent (voltage) samples of one channel.
    Waveform {
        /// Independent-variable samples.
        x: Vec<f64>,
        /// Dependent-variable samples.
        y: Vec<f64>,
    },
    /// Instrument reply text.
    Text(String),
}

impl PayloadValue {
    /// Short description for log lines.
    pub fn summary(&self) -> String {
        match self {
            PayloadValue::Position(p) => format!("position {}", p),
            PayloadValue::Waveform { x, .. } => format!("waveform ({} samples)", x.len()),
            PayloadValue::Text(s) => format!("text ({} bytes)", s.len()),
        }
    }
}

/// Outcome of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the action succeeded.
    pub success: bool,
    /// Data produced by the action, empty on failure.
    pub payload: Vec<PayloadValue>,
}

impl ExecutionResult {
    /// Successful result carrying `payload`.
    pub fn ok(payload: Vec<PayloadValue>) -> Self {
        Self {
            success: true,
            payload,
        }
    }

    /// Successful result without data.
    pub fn done() -> Self {
        Self::ok(Vec::new())
    }

    /// Failed result; the payload is always empty.
    pub fn failed() -> Self {
        Self {
            success: false,
            payload: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_round_trips_wire_tag() {
        for t in ActionType::ALL {
            assert_eq!(t.as_str().parse::<ActionType>().ok(), Some(t));
        }
        assert!("MoveAbs".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_action_display_matches_plan_listing() {
        let action = Action::move_stage("ScanStage", "X-Stage", 1.5);
        assert_eq!(
            action.to_string(),
            "Instrument:ScanStage,Action Type:MoveStage,Action Data:['X-Stage', 1.5]"
        );
        assert_eq!(
            Action::wait(0.5).to_string(),
            "Instrument:SYSTEM,Action Type:Wait,Action Data:[0.5]"
        );
    }

    #[test]
    fn test_param_accessors() {
        let action = Action::get_data("ScanOsc", 2);
        assert_eq!(action.int_param(0).ok(), Some(2));
        assert_eq!(action.float_param(0).ok(), Some(2.0));
        assert!(matches!(
            action.text_param(0),
            Err(StepFailure::MalformedAction(_))
        ));
        assert!(matches!(
            action.int_param(3),
            Err(StepFailure::MalformedAction(msg)) if msg.contains("got nothing")
        ));
    }

    #[test]
    fn test_failed_result_has_no_payload() {
        let result = ExecutionResult::failed();
        assert!(!result.success);
        assert!(result.payload.is_empty());
    }

    #[test]
    fn test_action_serializes_with_wire_tags() {
        let action = Action::set_acq_state("ScanOsc", "STOP");
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"SET_ACQ_STATE\""));
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }
}
