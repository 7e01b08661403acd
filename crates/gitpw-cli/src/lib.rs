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
#![allow(clippy::redundant_pub_crate)]

//! Command-line client for a Patchwork instance.
//!
//! Layout:
//! - `cli.rs`: argument parsing and command dispatch
//! - `commands/`: patch, series and bundle handlers
//! - `client.rs`: shared context, error taxonomy and exit codes
//! - `api.rs`: REST request layer and version-adaptive filter resolution
//! - `output.rs`: table/CSV/YAML renderers and the pager
//! - `git.rs`: `git am` integration
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod api;
pub(crate) mod cli;
pub(crate) mod client;
pub(crate) mod commands;
pub(crate) mod git;
pub(crate) mod output;

pub use cli::run;
