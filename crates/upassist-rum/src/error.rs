//! Error types for the RUM core.

/// Errors that can occur inside the RUM core.
///
/// Construction-time errors are returned to the host. Everything raised while
/// handling a command is logged at the handler boundary and never surfaces
/// into host code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Event rejected: {0}")]
    Rejected(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Persistent storage read or write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A page context value could not be read.
    #[error("Environment unavailable: {0}")]
    Environment(String),

    /// A command could not be understood.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}
