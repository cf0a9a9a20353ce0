#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

//! Real-Debrid REST client.
//!
//! Each method performs one request and classifies the outcome into
//! [`lodestar_core::RemoteError`]; pacing and retries belong to the caller.

pub mod client;
pub mod error;

pub use client::{DEFAULT_BASE_URL, HttpOptions, RealDebridClient};
pub use error::{ClientError, ClientResult};
