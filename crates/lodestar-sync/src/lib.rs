#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

//! Synchronisation core for Lodestar.
//!
//! Layout: `rate_limit.rs` and `remote.rs` (budgeted remote access), `store.rs`
//! (generation-versioned records), `tree/` (virtual tree derivation), `diff.rs`,
//! `refresh.rs`, `repair.rs`, `premium.rs` (periodic jobs), `scheduler.rs` (job
//! runner), `hook.rs` (library-update command), `maintenance.rs` (bulk cleanup),
//! `library.rs` (facade used by the binary).

pub mod context;
pub mod diff;
pub mod error;
pub mod hook;
pub mod library;
pub mod maintenance;
pub mod premium;
pub mod rate_limit;
pub mod refresh;
pub mod remote;
pub mod repair;
pub mod scheduler;
pub mod store;
pub mod tree;

pub use context::SyncContext;
pub use error::{SyncError, SyncResult};
pub use hook::{HookOutcome, LibraryHook};
pub use library::{Library, ShutdownReport};
pub use maintenance::ClearReport;
pub use premium::{PremiumMonitor, PremiumStatus};
pub use rate_limit::{ApiCategory, RateLimiter};
pub use refresh::{RefreshJob, RefreshOutcome, RefreshPhase};
pub use remote::RemoteCaller;
pub use repair::{RepairCandidate, RepairJob, RepairOutcome, RepairReason};
pub use scheduler::{PeriodicJob, Ticker, run_periodic, spawn_periodic};
pub use store::{StoreMutation, StoreSnapshot, TorrentStore};
pub use tree::{TreeDirectory, TreeFile, TreeNode, VirtualTree, build_tree};
