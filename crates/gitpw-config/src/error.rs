//! Error types for configuration resolution.

use thiserror::Error;

/// Primary error type for configuration resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No server URL was configured.
    #[error(
        "Server information missing\nYou must provide server information via git-config or via --server"
    )]
    MissingServer,
    /// The configured server could not be parsed as a URL.
    #[error("Server URL '{value}' is invalid: {reason}")]
    InvalidServer {
        /// Value supplied by the operator.
        value: String,
        /// Parser failure detail.
        reason: String,
    },
    /// No project was configured.
    #[error(
        "Project information missing\nYou must provide project information via git-config or via --project\nTo list all projects, set project to \"*\""
    )]
    MissingProject,
    /// Neither a token nor a username/password pair was configured.
    #[error(
        "Authentication information missing\nYou must configure authentication via git-config or via --token or --username, --password"
    )]
    MissingCredentials,
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
