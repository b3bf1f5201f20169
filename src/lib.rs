//! Cat adoption intake and review service.
//!
//! The crate exposes the adoption-request lifecycle (intake, review,
//! appeal, cancellation) together with the cat-availability bookkeeping
//! that accompanies each transition, plus the HTTP surface used to drive
//! the workflow.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
