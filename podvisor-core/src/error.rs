//! Error types for podvisor operations

/// Result type for podvisor operations
pub type Result<T> = std::result::Result<T, PodvisorError>;

/// Error types for podvisor core
#[derive(Debug, thiserror::Error)]
pub enum PodvisorError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Sidecar answered with a non-success status
    #[error("Sidecar error: {endpoint} returned {status}")]
    Sidecar {
        /// Endpoint path that failed
        endpoint: String,
        /// HTTP status code
        status: u16,
    },

    /// Transport error talking to an HTTP endpoint
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for PodvisorError {
    fn from(s: String) -> Self {
        PodvisorError::Other(s)
    }
}

impl From<&str> for PodvisorError {
    fn from(s: &str) -> Self {
        PodvisorError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for PodvisorError {
    fn from(err: anyhow::Error) -> Self {
        PodvisorError::Other(err.to_string())
    }
}

impl From<figment::Error> for PodvisorError {
    fn from(err: figment::Error) -> Self {
        PodvisorError::Configuration(format!("Failed to load configuration: {}", err))
    }
}
