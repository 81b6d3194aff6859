//! Scan-plan compilation.
//!
//! A [`ScanConfig`] describes a sweep over up to three linear axes; [`compile`] expands it
//! into a [`CompiledPlan`] of atomic actions that the
//! [`ExecutionLoop`](crate::engine::ExecutionLoop) runs in order.
//!
//! # Example
//!
//! ```
//! use scan_daq::scan::{compile, Axis, ScanConfig};
//!
//! let config = ScanConfig::new(
//!     vec![Axis::X, Axis::Y],
//!     [0.0, 0.0, 0.0],
//!     [1.0, 1.0, 0.0],
//!     [1.0, 1.0, 0.0],
//!     "ScanStage",
//!     "ScanOsc",
//!     0.5,
//!     100,
//! );
//! let plan = compile(&config)?;
//! assert_eq!(plan.read_block_count(), 4);
//! # Ok::<(), scan_daq::error::ScanError>(())
//! ```

pub mod compiler;
pub mod config;
pub mod plan;

pub use compiler::{
    compile, expand_axis, expected_len, grid_points, read_sequence, AxisSweep, MAX_PLAN_LEN,
};
pub use config::{Axis, ScanConfig, ScanKind};
pub use plan::CompiledPlan;
