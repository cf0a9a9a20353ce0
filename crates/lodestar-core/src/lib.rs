#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

//! Debrid-agnostic torrent records and the remote client contract.
//!
//! Layout: `model/` (records and wire DTOs), `service/` (the `RemoteClient` trait),
//! `codec.rs` (timestamp and flag serde helpers), `media.rs` (extension sets).

pub mod codec;
pub mod error;
pub mod media;
pub mod model;
pub mod service;

pub use error::{RemoteError, RemoteResult};
pub use media::PlayableExtensions;
pub use model::{
    AddedTorrent, DirectLink, Download, FileRecord, ListPage, TorrentDetail, TorrentRecord,
    TorrentStatus, TorrentSummary, UserAccount,
};
pub use service::RemoteClient;
