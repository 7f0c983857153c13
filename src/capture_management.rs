//! Capture management subsystem.
//!
//! Runs one capture loop per enabled and attached device and keeps that set
//! in line with the configuration.
//!
//! Re-exports:
//! - [`CaptureSupervisor`]: owns the registry and the reconciliation pass.
//! - [`spawn_scheduler`]: drives passes from a timer and config changes.
//! - [`RunningCapture`], [`ReconcileReport`]: core types.

pub mod scheduler;
pub mod supervisor;
pub mod types;

pub use scheduler::spawn_scheduler;
pub use supervisor::CaptureSupervisor;
pub use types::{ReconcileReport, RunningCapture};
