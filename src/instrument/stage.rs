//! Motion-stage adapter.
//!
//! Owns a set of named sub-stages (`X-Stage`, `Y-Stage`, a rotation mount, ...), each
//! assigned to an axis. At most one sub-stage serves each linear axis; any number of
//! rotational (`R`) stages may be attached and addressed by name through `MoveStage`.

use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::action::{Action, ActionType, PayloadValue};
use crate::error::{ScanError, ScanResult, StepFailure};
use crate::scan::Axis;

use super::driver::StageDriver;
use super::InstrumentAdapter;

const CAPABILITIES: &[ActionType] = &[ActionType::MoveToCoords, ActionType::MoveStage];

struct SubStage {
    axis: Axis,
    driver: Arc<dyn StageDriver>,
}

/// Executes `MoveToCoords` and `MoveStage` against a set of sub-stages.
#[derive(Default)]
pub struct MotionStageAdapter {
    stages: HashMap<String, SubStage>,
    linear_axes: HashMap<Axis, String>,
}

impl MotionStageAdapter {
    /// Adapter without sub-stages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a sub-stage under `name`, serving `axis`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Configuration`] if the name is taken or another sub-stage
    /// already serves the same linear axis.
    pub fn add_stage(
        &mut self,
        name: &str,
        axis: Axis,
        driver: Arc<dyn StageDriver>,
    ) -> ScanResult<()> {
        if self.stages.contains_key(name) {
            return Err(ScanError::Configuration(format!(
                "Sub-stage '{name}' is defined twice"
            )));
        }
        if axis.is_linear() {
            if let Some(existing) = self.linear_axes.get(&axis) {
                return Err(ScanError::Configuration(format!(
                    "Axis {axis} is already served by sub-stage '{existing}'"
                )));
            }
            self.linear_axes.insert(axis, name.to_string());
        }
        self.stages
            .insert(name.to_string(), SubStage { axis, driver });
        Ok(())
    }

    /// Builder form of [`add_stage`](Self::add_stage).
    ///
    /// # Errors
    ///
    /// See [`add_stage`](Self::add_stage).
    pub fn with_stage(
        mut self,
        name: &str,
        axis: Axis,
        driver: Arc<dyn StageDriver>,
    ) -> ScanResult<Self> {
        self.add_stage(name, axis, driver)?;
        Ok(self)
    }

    /// Names of all sub-stages, sorted.
    pub fn stage_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Sub-stage serving a linear axis.
    pub fn stage_for_axis(&self, axis: Axis) -> Option<&str> {
        self.linear_axes.get(&axis).map(String::as_str)
    }

    /// Axis a sub-stage serves.
    pub fn axis_of(&self, name: &str) -> Option<Axis> {
        self.stages.get(name).map(|s| s.axis)
    }

    /// Home every sub-stage.
    ///
    /// # Errors
    ///
    /// Returns the first driver error, with the sub-stage name as context.
    pub async fn home_all(&self) -> anyhow::Result<()> {
        for name in self.stage_names() {
            if let Some(stage) = self.stages.get(name) {
                info!(stage = name, "Homing sub-stage");
                stage
                    .driver
                    .home()
                    .await
                    .with_context(|| format!("homing sub-stage '{name}'"))?;
            }
        }
        Ok(())
    }

    fn stage(&self, name: &str) -> Result<&SubStage, StepFailure> {
        self.stages
            .get(name)
            .ok_or_else(|| StepFailure::UnknownSubStage(name.to_string()))
    }

    async fn move_stage(&self, name: &str, position: f64) -> Result<(), StepFailure> {
        let stage = self.stage(name)?;
        debug!(stage = name, position, "Moving sub-stage");
        stage
            .driver
            .move_abs(position)
            .await
            .with_context(|| format!("moving sub-stage '{name}' to {position}"))?;
        stage
            .driver
            .wait_settled()
            .await
            .with_context(|| format!("settling sub-stage '{name}'"))?;
        Ok(())
    }

    async fn move_to_coords(&self, coords: [f64; 3]) -> Result<(), StepFailure> {
        for axis in [Axis::X, Axis::Y, Axis::Z] {
            let name = self
                .stage_for_axis(axis)
                .ok_or_else(|| StepFailure::UnknownSubStage(axis.stage_name()))?;
            let index = axis.index().unwrap_or_default();
            self.move_stage(name, coords[index]).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl InstrumentAdapter for MotionStageAdapter {
    fn kind(&self) -> &'static str {
        "MotionStage"
    }

    fn capabilities(&self) -> &'static [ActionType] {
        CAPABILITIES
    }

    async fn try_execute(&self, action: &Action) -> Result<Vec<PayloadValue>, StepFailure> {
        match action.action_type() {
            ActionType::MoveToCoords => {
                let coords = action.coords_param(0)?;
                self.move_to_coords(coords).await?;
                Ok(Vec::new())
            }
            ActionType::MoveStage => {
                let name = action.text_param(0)?;
                let position = action.float_param(1)?;
                self.move_stage(name, position).await?;
                Ok(vec![PayloadValue::Position(position)])
            }
            other => Err(StepFailure::MalformedAction(format!(
                "Motion stage cannot execute {other}"
            ))),
        }
    }
}
