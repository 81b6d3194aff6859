//! Dispatch registry.
//!
//! Maps instrument names to adapters and routes each [`Action`] to its adapter after a
//! capability check. The registry is fully populated before a run and only read during
//! it. Lookup and capability failures are configuration errors: [`validate_plan`]
//! reports them before the first action runs, and [`dispatch`] reports them instead of
//! silently dropping the action.
//!
//! [`validate_plan`]: DispatchRegistry::validate_plan
//! [`dispatch`]: DispatchRegistry::dispatch

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::action::{Action, ExecutionResult, SYSTEM_INSTRUMENT};
use crate::config::{InstrumentDefinition, InstrumentType};
use crate::error::{ScanError, ScanResult};
use crate::instrument::mock::{MockScope, MockStage};
use crate::instrument::{InstrumentAdapter, MotionStageAdapter, OscilloscopeAdapter, SystemAdapter};
use crate::scan::CompiledPlan;

/// Instrument name → adapter.
pub struct DispatchRegistry {
    adapters: HashMap<String, Arc<dyn InstrumentAdapter>>,
}

impl Default for DispatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchRegistry {
    /// Registry holding only a non-interruptible System adapter under `SYSTEM`.
    pub fn new() -> Self {
        Self::with_system(SystemAdapter::new())
    }

    /// Registry holding `system` under `SYSTEM`.
    pub fn with_system(system: SystemAdapter) -> Self {
        let mut adapters: HashMap<String, Arc<dyn InstrumentAdapter>> = HashMap::new();
        adapters.insert(SYSTEM_INSTRUMENT.to_string(), Arc::new(system));
        Self { adapters }
    }

    /// Build a registry from instrument definitions, wiring simulated drivers.
    ///
    /// Motion stages with `home_stages` set are homed before this returns.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for duplicate names or sub-stages, and
    /// [`ScanError::Configuration`] if homing fails.
    pub async fn from_config(
        definitions: &[InstrumentDefinition],
        system: SystemAdapter,
    ) -> ScanResult<Self> {
        let mut registry = Self::with_system(system);
        for definition in definitions {
            let adapter: Arc<dyn InstrumentAdapter> = match definition.r#type {
                InstrumentType::MotionStage => {
                    let mut stage = MotionStageAdapter::new();
                    for sub in &definition.stages {
                        stage.add_stage(&sub.name, sub.axis, Arc::new(MockStage::new()))?;
                    }
                    if definition.home_stages {
                        stage.home_all().await.map_err(|err| {
                            ScanError::Configuration(format!(
                                "Instrument '{}': {err:#}",
                                definition.name
                            ))
                        })?;
                    }
                    Arc::new(stage)
                }
                InstrumentType::Oscilloscope => {
                    let model = definition.model.as_deref().unwrap_or("generic");
                    let driver = Arc::new(MockScope::new(definition.record_length));
                    let scope = OscilloscopeAdapter::connect(model, driver)
                        .await
                        .map_err(|err| {
                            ScanError::Configuration(format!(
                                "Instrument '{}': {err:#}",
                                definition.name
                            ))
                        })?;
                    Arc::new(scope)
                }
            };
            info!(
                instrument = %definition.name,
                kind = adapter.kind(),
                address = definition.address.as_deref().unwrap_or("-"),
                "Instrument registered (simulated)"
            );
            registry.register(&definition.name, adapter)?;
        }
        Ok(registry)
    }

    /// Register `adapter` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::DuplicateInstrument`] if the name is taken.
    pub fn register(&mut self, name: &str, adapter: Arc<dyn InstrumentAdapter>) -> ScanResult<()> {
        if self.adapters.contains_key(name) {
            return Err(ScanError::DuplicateInstrument(name.to_string()));
        }
        self.adapters.insert(name.to_string(), adapter);
        Ok(())
    }

    /// Adapter registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn InstrumentAdapter>> {
        self.adapters.get(name)
    }

    /// Registered instrument names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered instruments, `SYSTEM` included.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Always false: `SYSTEM` is registered on construction.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Adapter that would execute `action`, after the capability check.
    ///
    /// # Errors
    ///
    /// [`ScanError::UnknownInstrument`] or [`ScanError::UnsupportedAction`].
    pub fn resolve(&self, action: &Action) -> ScanResult<&Arc<dyn InstrumentAdapter>> {
        let adapter = self
            .adapters
            .get(action.instrument())
            .ok_or_else(|| ScanError::UnknownInstrument(action.instrument().to_string()))?;
        if !adapter.supports(action.action_type()) {
            return Err(ScanError::UnsupportedAction {
                instrument: action.instrument().to_string(),
                action_type: action.action_type().to_string(),
            });
        }
        Ok(adapter)
    }

    /// Check every action of `plan` against the registry.
    ///
    /// # Errors
    ///
    /// The first [`resolve`](Self::resolve) error.
    pub fn validate_plan(&self, plan: &CompiledPlan) -> ScanResult<()> {
        for action in plan {
            self.resolve(action)?;
        }
        Ok(())
    }

    /// Route `action` to its adapter and return the adapter's result unchanged.
    ///
    /// No retries and no timeouts happen here; those belong to the adapters.
    ///
    /// # Errors
    ///
    /// [`ScanError::UnknownInstrument`] or [`ScanError::UnsupportedAction`]. Step failures
    /// are not errors; they come back as an unsuccessful [`ExecutionResult`].
    pub async fn dispatch(&self, action: &Action) -> ScanResult<ExecutionResult> {
        let adapter = self.resolve(action)?;
        debug!(%action, "Dispatching");
        Ok(adapter.execute(action).await)
    }
}
