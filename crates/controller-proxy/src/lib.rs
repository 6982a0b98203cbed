//! The TLS front-door proxy (§4.1, "THE CORE" module #1): terminates TLS,
//! authenticates the caller by client certificate, proxy session cookie, or
//! a native-auth challenge/response handshake, routes by URL prefix to one
//! of N configured backends, and tunnels WebSocket upgrades bidirectionally.

pub mod config;
mod connection;
pub mod error;
mod identity;
mod native_state;
mod router;
pub mod server;
mod tls;

pub use config::{BackendConfig, ProxyConfig, TlsConfig, VerifyClient};
pub use error::ProxyError;
pub use server::{ProxyServer, ProxyState};
