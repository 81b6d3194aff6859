//! Oscilloscope-class reader adapter.

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::action::{Action, ActionType, PayloadValue};
use crate::error::StepFailure;

use super::driver::{AcquisitionMode, AcquisitionState, ScopeDriver};
use super::InstrumentAdapter;

const CAPABILITIES: &[ActionType] = &[
    ActionType::SetAcqMode,
    ActionType::SetAcqState,
    ActionType::GetData,
    ActionType::GetAcqParams,
];

/// Executes acquisition control and waveform fetches on a scope driver.
///
/// The record length is read once at connection; every `GET_DATA` must return exactly
/// that many samples.
pub struct OscilloscopeAdapter {
    model: String,
    record_length: usize,
    driver: Arc<dyn ScopeDriver>,
}

impl OscilloscopeAdapter {
    /// Wrap `driver`, reading its record length.
    ///
    /// # Errors
    ///
    /// Fails if the driver cannot report its record length.
    pub async fn connect(model: &str, driver: Arc<dyn ScopeDriver>) -> anyhow::Result<Self> {
        let record_length = driver
            .record_length()
            .await
            .with_context(|| format!("{model}: reading record length"))?;
        info!(model, record_length, "Oscilloscope connected");
        Ok(Self {
            model: model.to_string(),
            record_length,
            driver,
        })
    }

    async fn set_acq_mode(&self, action: &Action) -> Result<(), StepFailure> {
        let mode: AcquisitionMode = action.text_param(0)?.parse()?;
        let averages = action.int_param(1)?;
        let averages = u32::try_from(averages).map_err(|_| {
            StepFailure::MalformedAction(format!("Average count {averages} out of range"))
        })?;
        self.driver
            .set_acquisition_mode(mode)
            .await
            .with_context(|| format!("setting acquisition mode {mode}"))?;
        self.driver
            .set_number_averages(averages)
            .await
            .with_context(|| format!("setting {averages} averages"))?;
        Ok(())
    }

    async fn get_data(&self, channel: i64) -> Result<PayloadValue, StepFailure> {
        let channel = u8::try_from(channel)
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| StepFailure::MalformedAction(format!("Invalid channel {channel}")))?;
        let (x, y) = self
            .driver
            .get_data(channel)
            .await
            .with_context(|| format!("reading channel {channel}"))?;
        if x.len() != y.len() {
            return Err(StepFailure::Driver(format!(
                "{}: channel {channel} returned {} time samples but {} values",
                self.model,
                x.len(),
                y.len()
            )));
        }
        if x.len() != self.record_length {
            return Err(StepFailure::Driver(format!(
                "{}: channel {channel} returned {} samples, record length is {}",
                self.model,
                x.len(),
                self.record_length
            )));
        }
        debug!(channel, samples = x.len(), "Waveform fetched");
        Ok(PayloadValue::Waveform { x, y })
    }
}

#[async_trait]
impl InstrumentAdapter for OscilloscopeAdapter {
    fn kind(&self) -> &'static str {
        "Oscilloscope"
    }

    fn capabilities(&self) -> &'static [ActionType] {
        CAPABILITIES
    }

    async fn try_execute(&self, action: &Action) -> Result<Vec<PayloadValue>, StepFailure> {
        match action.action_type() {
            ActionType::SetAcqMode => {
                self.set_acq_mode(action).await?;
                Ok(Vec::new())
            }
            ActionType::SetAcqState => {
                let state: AcquisitionState = action.text_param(0)?.parse()?;
                self.driver
                    .set_acquisition_state(state)
                    .await
                    .with_context(|| format!("setting acquisition state {state}"))?;
                Ok(Vec::new())
            }
            ActionType::GetData => {
                let waveform = self.get_data(action.int_param(0)?).await?;
                Ok(vec![waveform])
            }
            ActionType::GetAcqParams => {
                let settings = self
                    .driver
                    .query_acquisition()
                    .await
                    .context("querying acquisition settings")?;
                Ok(vec![PayloadValue::Text(settings)])
            }
            other => Err(StepFailure::MalformedAction(format!(
                "Oscilloscope cannot execute {other}"
            ))),
        }
    }
}
