//! remdesk client library
//!
//! Session runtime for remote-desktop style connections: a registry of
//! sessions, one connection state machine per session, and a last-error
//! channel the host polls. `mobile` exposes the same operations over a C ABI.

pub mod auth;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod error_channel;
pub mod logging;
mod machine;
pub mod mobile;
mod registry;
pub mod services;
pub mod state;

pub use auth::{Authenticator, PresharedKeyAuthenticator, PresharedKeyVerifier, SharedAuthenticator};
pub use config::RuntimeConfig;
pub use dataplane::{DataPlane, NullDataPlane, OutboundFrame, SharedDataPlane};
pub use error::{AuthError, ErrorKind, SessionError};
pub use error_channel::{ErrorTarget, NO_ERROR};
pub use registry::RuntimeHandle;
pub use services::Services;
pub use state::{SessionEvent, SessionId, SessionInfo, SessionState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
