//! Per-invocation settings resolved from overrides, then the persistent store.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::{ConfigError, ConfigResult};
use crate::server::ServerDescriptor;
use crate::store::ConfigStore;

/// Namespace under which settings live in the persistent store.
pub const NAMESPACE: &str = "pw";

/// Patch states accepted when `pw.states` is not configured.
pub const DEFAULT_STATES: &[&str] = &[
    "new",
    "under-review",
    "accepted",
    "rejected",
    "rfc",
    "not-applicable",
    "changes-requested",
    "awaiting-upstream",
    "superseded",
    "deferred",
];

/// Settings understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// Server base URL.
    Server,
    /// Project filter; `*` disables it.
    Project,
    /// API token.
    Token,
    /// Basic-auth username.
    Username,
    /// Basic-auth password.
    Password,
    /// Verbose diagnostics toggle.
    Debug,
    /// Comma-separated allow-list of patch states.
    States,
    /// Default output format.
    Format,
}

impl ConfigKey {
    /// Short name of the setting.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Project => "project",
            Self::Token => "token",
            Self::Username => "username",
            Self::Password => "password",
            Self::Debug => "debug",
            Self::States => "states",
            Self::Format => "format",
        }
    }

    /// Fully qualified key in the persistent store.
    #[must_use]
    pub fn store_key(self) -> String {
        format!("{NAMESPACE}.{}", self.as_str())
    }
}

/// Authentication scheme resolved for this invocation.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `Authorization: Token <token>`.
    Token(String),
    /// HTTP basic authentication.
    Basic {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => formatter.write_str("Token(***)"),
            Self::Basic { username, .. } => formatter
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

/// Configuration resolver: explicit values first, then the cached store.
pub struct Settings {
    overrides: HashMap<ConfigKey, String>,
    cache: Mutex<HashMap<ConfigKey, Option<String>>>,
    store: Box<dyn ConfigStore>,
}

impl Settings {
    /// Create a resolver over the given persistent store.
    #[must_use]
    pub fn new(store: impl ConfigStore + 'static) -> Self {
        Self {
            overrides: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
            store: Box::new(store),
        }
    }

    /// Record an explicit value (flag or environment). Blank values are ignored.
    #[must_use]
    pub fn with_override(mut self, key: ConfigKey, value: Option<String>) -> Self {
        if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
            self.overrides.insert(key, value);
        }
        self
    }

    /// Resolve a setting, consulting the store at most once per key.
    pub fn get(&self, key: ConfigKey) -> Option<String> {
        if let Some(value) = self.overrides.get(&key) {
            return Some(value.clone());
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(&key) {
            tracing::debug!("Retrieved '{}' setting from cache", key.as_str());
            return cached.clone();
        }

        let value = self.store.get(&key.store_key());
        if value.is_some() {
            tracing::debug!("Retrieved '{}' setting from git-config", key.as_str());
        }
        cache.insert(key, value.clone());
        value
    }

    /// Resolve a setting or fall back to `default`.
    pub fn get_or(&self, key: ConfigKey, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Read a key outside the client namespace, such as `core.parser`.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    /// Normalised server descriptor.
    ///
    /// # Errors
    ///
    /// Fails when no server is configured or it is not a URL.
    pub fn server(&self) -> ConfigResult<ServerDescriptor> {
        let raw = self.get(ConfigKey::Server).ok_or(ConfigError::MissingServer)?;
        ServerDescriptor::parse(&raw)
    }

    /// Project filter value; the wildcard `*` maps to the empty string.
    ///
    /// # Errors
    ///
    /// Fails when no project is configured.
    pub fn project(&self) -> ConfigResult<String> {
        let project = self
            .get(ConfigKey::Project)
            .ok_or(ConfigError::MissingProject)?;
        let project = project.trim();
        if project == "*" {
            return Ok(String::new());
        }
        Ok(project.to_string())
    }

    /// Token takes precedence over a username/password pair.
    pub fn credentials(&self) -> Option<Credentials> {
        if let Some(token) = self.get(ConfigKey::Token) {
            return Some(Credentials::Token(token.trim().to_string()));
        }
        match (self.get(ConfigKey::Username), self.get(ConfigKey::Password)) {
            (Some(username), Some(password)) => Some(Credentials::Basic { username, password }),
            _ => None,
        }
    }

    /// Credentials for operations that never run anonymously.
    ///
    /// # Errors
    ///
    /// Fails when no authentication scheme is configured.
    pub fn require_credentials(&self) -> ConfigResult<Credentials> {
        self.credentials().ok_or(ConfigError::MissingCredentials)
    }

    /// Whether verbose diagnostics were requested.
    pub fn debug(&self) -> bool {
        self.get(ConfigKey::Debug).is_some_and(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "on" | "1"
            )
        })
    }

    /// Allowed patch states.
    pub fn states(&self) -> Vec<String> {
        self.get(ConfigKey::States).map_or_else(
            || DEFAULT_STATES.iter().map(|state| (*state).to_string()).collect(),
            |raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|state| !state.is_empty())
                    .map(str::to_string)
                    .collect()
            },
        )
    }

    /// Persisted default output format, if any.
    pub fn format(&self) -> Option<String> {
        self.get(ConfigKey::Format)
    }
}
