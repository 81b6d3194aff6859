//! Scan-plan compiler and action-dispatch engine for measurement sweeps.
//!
//! A sweep over up to three linear axes is described declaratively by a
//! [`ScanConfig`](scan::ScanConfig), compiled ahead of time into a flat
//! [`CompiledPlan`](scan::CompiledPlan) of atomic [`Action`](action::Action)s, and then
//! run strictly in order by the [`ExecutionLoop`](engine::ExecutionLoop). Each action is
//! routed by the [`DispatchRegistry`](registry::DispatchRegistry) to the
//! [`InstrumentAdapter`](instrument::InstrumentAdapter) registered under its instrument
//! name; every executed step is reported to a [`Recorder`](recorder::Recorder).
//!
//! The binary wraps this in a CLI (`plan`, `validate`, `run`) driven by a TOML
//! configuration file.

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod recorder;
pub mod registry;
pub mod scan;
