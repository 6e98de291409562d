//! Error types for supervisor operations

use podvisor_core::error::PodvisorError;
use thiserror::Error;

/// Result type for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Error types for supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Agent crashed {restarts} times in a row (max {max}), giving up")]
    MaxRestartsExceeded { restarts: u32, max: u32 },

    #[error("Failed to spawn session process: {0}")]
    Spawn(String),

    #[error("Fleet directory error: {0}")]
    Fleet(String),

    #[error("Credential refresh failed: {0}")]
    Credentials(String),

    #[error(transparent)]
    Core(#[from] PodvisorError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
