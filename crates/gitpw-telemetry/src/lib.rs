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

//! Logging primitives for the `git-pw` workspace.
//!
//! Layout: `init.rs` (subscriber installation and format selection),
//! `error.rs` (typed failures surfaced by installation).

pub mod error;
pub mod init;

pub use error::{Result, TelemetryError};
pub use init::{DEBUG_LOG_LEVEL, DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
