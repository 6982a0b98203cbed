//! The agent fleet registry (§4.4): registration, heartbeats, environment
//! ACL filtering, reachability probes, and status derivation.

pub mod acl;
pub mod error;
pub mod ping;
pub mod service;

pub use acl::AllowedEnvironments;
pub use error::RegistryError;
pub use ping::PingResult;
pub use service::{AgentRegistry, AgentUpdate};
