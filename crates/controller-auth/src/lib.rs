//! Identity normalization, session storage, principal/role modeling, and the
//! [`resolver::AuthResolver`] capability checks shared by the proxy and the
//! API surface. This crate defines the lookup traits that the store crate
//! implements; it has no dependency on a concrete persistence layer.

pub mod error;
pub mod identity;
pub mod native;
pub mod principal;
pub mod resolver;
pub mod session;
pub mod token;

pub use error::AuthError;
pub use principal::{Principal, Role};
pub use resolver::{AuthResolver, ExecutionTokenDirectory, PrincipalDirectory};
pub use session::{Session, SessionId, SessionStore};
pub use token::{ExecutionToken, TokenRecord};
