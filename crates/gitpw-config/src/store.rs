//! Persistent key/value backends consulted after explicit overrides.

use std::collections::HashMap;
use std::ffi::OsString;
use std::process::Command;

/// Read-only source of persisted configuration values.
pub trait ConfigStore: Send + Sync {
    /// Fetch the raw value stored under a fully qualified key
    /// (for example `pw.server` or `core.parser`).
    fn get(&self, key: &str) -> Option<String>;
}

/// Store backed by the `git config` command of the current repository.
#[derive(Debug, Clone)]
pub struct GitConfigStore {
    program: OsString,
}

impl Default for GitConfigStore {
    fn default() -> Self {
        Self {
            program: OsString::from("git"),
        }
    }
}

impl GitConfigStore {
    /// Use an alternative `git` executable.
    #[must_use]
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ConfigStore for GitConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        let output = match Command::new(&self.program).args(["config", key]).output() {
            Ok(output) => output,
            Err(err) => {
                tracing::debug!(key, error = %err, "git config lookup failed");
                return None;
            }
        };
        // git exits 1 for unset keys
        if !output.status.success() {
            return None;
        }
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!value.is_empty()).then_some(value)
    }
}

/// In-memory store, used when no persistent backend is wanted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    /// Build a store from key/value pairs.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}
