#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Layered configuration for the `git-pw` client.
//!
//! Layout: `store.rs` (persistent key/value backends, `git config` first),
//! `settings.rs` (`Settings`: per-invocation overrides over a cached store),
//! `server.rs` (server URL normalisation and API version model),
//! `error.rs` (typed configuration failures).

pub mod error;
pub mod server;
pub mod settings;
pub mod store;

pub use error::{ConfigError, ConfigResult};
pub use server::{ApiVersion, ServerDescriptor};
pub use settings::{ConfigKey, Credentials, DEFAULT_STATES, Settings};
pub use store::{ConfigStore, GitConfigStore, MemoryStore};
