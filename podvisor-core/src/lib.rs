//! # Podvisor Core
//!
//! Shared building blocks for the podvisor agent supervisor:
//! - [`config::SupervisorConfig`]: immutable startup configuration, layered from
//!   defaults, `podvisor.toml`, `PODVISOR_*` environment variables and pod identity
//! - [`sidecar`]: typed client for the coop sidecar control API
//! - [`error`]: the crate-wide error type
//!
//! The supervisor loop itself lives in `podvisor-supervisor`.

pub mod config;
pub mod error;
pub mod sidecar;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::SupervisorConfig;
    pub use crate::error::{PodvisorError, Result};
    pub use crate::sidecar::{AgentState, AgentStatus, ControlApi, NudgeOutcome, SidecarClient};
}
