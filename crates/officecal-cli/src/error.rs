//! CLI error types.

use officecal_graph::{ErrorKind, GraphError};
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that end a CLI invocation.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure reported by the Graph layer.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Output could not be written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Output could not be encoded.
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// Sign-in problems get their own code so scripts can tell them apart.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Graph(e) => match e.kind() {
                ErrorKind::AuthRequired
                | ErrorKind::AuthError
                | ErrorKind::AuthTimeout
                | ErrorKind::AuthDenied => 3,
                ErrorKind::Configuration => 2,
                _ => 1,
            },
            Self::Io(_) | Self::Json(_) => 1,
        }
    }
}
