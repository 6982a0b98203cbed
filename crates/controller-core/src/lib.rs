//! Shared leaf-level primitives used by every other `controller-*` crate:
//! cheap identifiers, atomic config swapping, graceful shutdown/drain,
//! structured logging, and process metrics.

pub mod arc;
pub mod id;
pub mod responsechannel;
pub mod signal;
pub mod telemetry;
pub mod version;

pub use id::Id;
