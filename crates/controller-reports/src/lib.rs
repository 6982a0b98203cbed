//! The report dispatcher (§4.6, "THE CORE" module #3): a registry of
//! read-only diagnostic scripts plus a dispatcher that runs one against a
//! single online agent and streams its output to any number of
//! subscribers.

pub mod error;
pub mod executor;
pub mod frame;
pub mod id;
pub mod schema;
pub mod service;

pub use error::ReportError;
pub use executor::{AgentExecuteResponse, ExecuteError, HttpReportExecutor, ReportExecutor};
pub use frame::StreamFrame;
pub use service::{ReportDispatcher, RunRequest};
