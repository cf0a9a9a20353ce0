#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

//! File-backed configuration for the Lodestar daemon.
//!
//! Layout: `model.rs` (raw YAML document and typed settings), `defaults.rs` (default
//! values and lookup paths), `validate.rs` (raw → typed conversion), `policy.rs`
//! (tree-building policy and directory rules), `loader.rs` (path resolution and parsing).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod policy;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, parse_str, resolve_config_path};
pub use model::{AppConfig, RawConfig, RawDirectory, RawFilter, SyncSettings};
pub use policy::{DirectoryGroup, DirectoryRule, TorrentFilter, TreePolicy};
