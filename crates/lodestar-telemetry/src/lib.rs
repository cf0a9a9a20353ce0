#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

//! Telemetry primitives shared across the Lodestar workspace.
//!
//! Logging, the command span, and sync metrics live here so every
//! crate reports through the same subscriber and registry.

pub mod context;
pub mod error;
pub mod init;
pub mod metrics;

pub use context::CommandSpan;
pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
