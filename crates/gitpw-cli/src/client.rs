//! Shared client context, error taxonomy, and exit-code mapping for the CLI.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use anyhow::anyhow;
use gitpw_config::{ApiVersion, ConfigError, ServerDescriptor, Settings};
use once_cell::sync::OnceCell;
use reqwest::{Client, StatusCode};

use crate::git::Git;

pub(crate) const USER_AGENT: &str = concat!("git-pw (", env!("CARGO_PKG_VERSION"), ")");
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// What a failed request was trying to do, for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Fetch,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub(crate) const fn verb(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Transport and HTTP status failures.
#[derive(Debug)]
pub(crate) enum HttpError {
    /// 5xx with a body: an upstream bug worth surfacing in full.
    Server { status: StatusCode, body: String },
    NotFound,
    /// Any other client error; the body is assumed to be JSON.
    Rejected { status: StatusCode, body: String },
    /// Error status without a body.
    Empty {
        operation: Operation,
        status: StatusCode,
    },
    /// No response at all.
    Unreachable {
        operation: Operation,
        source: reqwest::Error,
    },
}

/// CLI-level error type; each variant maps to one user-facing outcome.
#[derive(Debug)]
pub(crate) enum CliError {
    Config(ConfigError),
    Validation(String),
    Http(HttpError),
    /// `git am` failed; its output is surfaced verbatim.
    Process { code: i32, output: String },
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Process { code, .. } => *code,
            _ => 1,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Config(err) => err.to_string(),
            Self::Validation(message) => message.clone(),
            Self::Http(HttpError::Server { .. }) => {
                "Server error. Please report this issue to https://github.com/getpatchwork/patchwork"
                    .to_string()
            }
            Self::Http(HttpError::NotFound) => "Resource not found".to_string(),
            Self::Http(HttpError::Rejected { body, .. }) => body.clone(),
            Self::Http(
                HttpError::Empty { operation, .. } | HttpError::Unreachable { operation, .. },
            ) => format!(
                "Failed to {} resource. Is your configuration correct?\nUse the '--debug' flag for more information",
                operation.verb()
            ),
            Self::Process { output, .. } => output.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }

    /// Full diagnostic detail, printed for server errors and in debug mode.
    pub(crate) fn diagnostic(&self) -> Option<String> {
        match self {
            Self::Http(HttpError::Server { status, body })
            | Self::Http(HttpError::Rejected { status, body }) => {
                Some(format!("status {status}: {}", body.trim()))
            }
            Self::Http(HttpError::Empty { status, .. }) => {
                Some(format!("status {status} with an empty body"))
            }
            Self::Http(HttpError::Unreachable { source, .. }) => Some(format!("{source:?}")),
            Self::Failure(error) => Some(format!("{error:?}")),
            _ => None,
        }
    }

    /// Server-side bugs always surface their diagnostic.
    pub(crate) const fn always_diagnose(&self) -> bool {
        matches!(self, Self::Http(HttpError::Server { .. }))
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<HttpError> for CliError {
    fn from(err: HttpError) -> Self {
        Self::Http(err)
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.display_message())
    }
}

impl std::error::Error for CliError {}

/// Application context passed to command handlers.
pub(crate) struct AppContext {
    pub(crate) client: Client,
    pub(crate) settings: Settings,
    pub(crate) git: Git,
    server: OnceCell<ServerDescriptor>,
}

impl AppContext {
    pub(crate) fn new(client: Client, settings: Settings, git: Git) -> Self {
        Self {
            client,
            settings,
            git,
            server: OnceCell::new(),
        }
    }

    /// Construct the HTTP client shared by every request of this invocation.
    pub(crate) fn build_client(timeout: Duration) -> CliResult<Client> {
        Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| CliError::failure(anyhow!("failed to build HTTP client: {err}")))
    }

    /// Resolved server; the unversioned-URL warning fires on first use only.
    pub(crate) fn server(&self) -> CliResult<&ServerDescriptor> {
        self.server
            .get_or_try_init(|| {
                let server = self.settings.server()?;
                server.warn_if_unversioned();
                Ok(server)
            })
    }

    pub(crate) fn version(&self) -> CliResult<ApiVersion> {
        Ok(self.server()?.version())
    }
}

#[cfg(test)]
pub(crate) fn test_context(server_url: &str, pairs: &[(&str, &str)]) -> AppContext {
    use gitpw_config::{ConfigKey, MemoryStore};

    let settings = Settings::new(MemoryStore::from_pairs(pairs.iter().copied()))
        .with_override(ConfigKey::Server, Some(server_url.to_string()));
    AppContext::new(
        Client::new(),
        settings,
        Git::with_program("true"),
    )
}
