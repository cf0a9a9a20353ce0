#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

//! Shared test helpers used across Lodestar test suites.
//! Layout: fixtures.rs (record builders), remote.rs (scripted in-memory remote).

pub mod fixtures;
pub mod remote;

pub use remote::{Failure, Operation, ScriptedRemote};
