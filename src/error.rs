//! Custom error types for the scan engine.
//!
//! Two kinds of failure exist and the type system keeps them apart:
//!
//! - **`ScanError`**: structural problems with a scan configuration, an instrument
//!   registry or a configuration file. These are detected before a run starts (compile
//!   time, registry build time, plan validation) and are fatal: the run must not start.
//! - **`StepFailure`**: a single action failed at the driver boundary (hardware fault,
//!   malformed parameters, unknown sub-stage, interrupted wait). Adapters log it and
//!   collapse it into an unsuccessful [`ExecutionResult`](crate::action::ExecutionResult).
//!   It never terminates a scan on its own.
//!
//! `ScanError` derives from `thiserror` and converts from the underlying error types with
//! `#[from]`, so the `?` operator works across configuration loading and I/O.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Fatal errors raised before or between runs.
#[derive(Error, Debug)]
pub enum ScanError {
    /// A scan configuration is structurally invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An action references an instrument that is not registered.
    #[error("Configuration error: no instrument registered under '{0}'")]
    UnknownInstrument(String),

    /// An action type is outside the capability set of its target adapter.
    #[error("Configuration error: instrument '{instrument}' does not support action type '{action_type}'")]
    UnsupportedAction {
        /// Target instrument name.
        instrument: String,
        /// Offending action type tag.
        action_type: String,
    },

    /// Two adapters were registered under the same name.
    #[error("Configuration error: instrument '{0}' is registered twice")]
    DuplicateInstrument(String),

    /// Configuration file or environment could not be loaded.
    #[error("Configuration load error: {0}")]
    Config(#[from] figment::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// True for every variant that means "the run must not start".
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScanError::Configuration(_)
                | ScanError::UnknownInstrument(_)
                | ScanError::UnsupportedAction { .. }
                | ScanError::DuplicateInstrument(_)
                | ScanError::Config(_)
        )
    }
}

/// Failure of a single action at the driver boundary.
#[derive(Error, Debug)]
pub enum StepFailure {
    /// The driver reported an error.
    #[error("driver fault: {0}")]
    Driver(String),

    /// The action parameters do not match the layout its type requires.
    #[error("malformed action: {0}")]
    MalformedAction(String),

    /// A motion-stage action named a sub-stage the adapter does not own.
    #[error("unknown sub-stage '{0}'")]
    UnknownSubStage(String),

    /// A blocking wait was interrupted before it elapsed.
    #[error("wait interrupted")]
    Interrupted,
}

impl From<anyhow::Error> for StepFailure {
    fn from(err: anyhow::Error) -> Self {
        StepFailure::Driver(format!("{err:#}"))
    }
}
