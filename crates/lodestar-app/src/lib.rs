#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

//! Lodestar daemon wiring.
//!
//! Layout: `cli.rs` (argument parsing), `bootstrap.rs` (config, logging, and command
//! dispatch), `error.rs` (application error type).

/// Configuration loading and command dispatch.
pub mod bootstrap;
/// Command-line definitions.
pub mod cli;
/// Application error type.
pub mod error;

pub use bootstrap::{BUILD_SHA, run_app};
pub use cli::{Cli, Command};
pub use error::{AppError, AppResult};
