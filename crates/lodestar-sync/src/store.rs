//! Generation-versioned torrent store.
//!
//! # Design
//! - Readers take an `Arc` of the last committed snapshot and never block writers.
//! - A single writer at a time holds a [`StoreMutation`]; nothing it changes is visible
//!   until [`StoreMutation::commit`] publishes a new generation and its tree.
//! - Dropping a mutation without committing discards it.

use std::collections::BTreeMap;
use std::sync::Arc;

use lodestar_config::TreePolicy;
use lodestar_core::TorrentRecord;
use lodestar_telemetry::Metrics;
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::debug;

use crate::tree::{VirtualTree, build_tree};

/// Immutable view of the store at one generation.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Commit counter; starts at zero for the empty store.
    pub generation: u64,
    /// Records keyed by remote identifier.
    pub records: BTreeMap<String, TorrentRecord>,
}

impl StoreSnapshot {
    /// Record lookup.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TorrentRecord> {
        self.records.get(id)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Owner of the committed snapshot and the tree derived from it.
pub struct TorrentStore {
    policy: Arc<TreePolicy>,
    snapshots: watch::Sender<Arc<StoreSnapshot>>,
    trees: watch::Sender<Arc<VirtualTree>>,
    writer: Mutex<()>,
    metrics: Metrics,
}

impl TorrentStore {
    /// Empty store at generation zero.
    #[must_use]
    pub fn new(policy: Arc<TreePolicy>, metrics: Metrics) -> Self {
        let snapshot = Arc::new(StoreSnapshot::default());
        let tree = Arc::new(build_tree(&snapshot, &policy));
        let (snapshots, _) = watch::channel(snapshot);
        let (trees, _) = watch::channel(tree);
        Self {
            policy,
            snapshots,
            trees,
            writer: Mutex::new(()),
            metrics,
        }
    }

    /// Policy the tree is built with.
    #[must_use]
    pub fn policy(&self) -> &TreePolicy {
        &self.policy
    }

    /// Last committed snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Tree built from the last committed snapshot.
    #[must_use]
    pub fn tree(&self) -> Arc<VirtualTree> {
        self.trees.borrow().clone()
    }

    /// Receiver notified on every commit.
    #[must_use]
    pub fn subscribe_snapshots(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Receiver notified whenever a new tree is published.
    #[must_use]
    pub fn subscribe_tree(&self) -> watch::Receiver<Arc<VirtualTree>> {
        self.trees.subscribe()
    }

    /// Wait for exclusive write access and start a batch from the committed state.
    pub async fn begin_mutation(&self) -> StoreMutation<'_> {
        let guard = self.writer.lock().await;
        let base = self.snapshot();
        StoreMutation {
            store: self,
            _guard: guard,
            generation: base.generation,
            records: base.records.clone(),
            dirty: false,
        }
    }

    fn publish(&self, snapshot: StoreSnapshot) -> u64 {
        let generation = snapshot.generation;
        let tree = build_tree(&snapshot, &self.policy);
        self.metrics
            .observe_commit(generation, snapshot.records.len(), tree.file_count());
        debug!(
            generation,
            torrents = snapshot.records.len(),
            files = tree.file_count(),
            "store committed"
        );
        self.snapshots.send_replace(Arc::new(snapshot));
        self.trees.send_replace(Arc::new(tree));
        generation
    }
}

/// Exclusive, uncommitted batch of changes.
pub struct StoreMutation<'a> {
    store: &'a TorrentStore,
    _guard: MutexGuard<'a, ()>,
    generation: u64,
    records: BTreeMap<String, TorrentRecord>,
    dirty: bool,
}

impl StoreMutation<'_> {
    /// Generation the batch started from.
    #[must_use]
    pub const fn base_generation(&self) -> u64 {
        self.generation
    }

    /// Record lookup including uncommitted changes.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TorrentRecord> {
        self.records.get(id)
    }

    /// All records including uncommitted changes.
    #[must_use]
    pub const fn records(&self) -> &BTreeMap<String, TorrentRecord> {
        &self.records
    }

    /// Insert or replace a record.
    pub fn put(&mut self, record: TorrentRecord) {
        self.dirty = true;
        self.records.insert(record.id.clone(), record);
    }

    /// Remove a record, returning it when present.
    pub fn remove(&mut self, id: &str) -> Option<TorrentRecord> {
        let removed = self.records.remove(id);
        self.dirty |= removed.is_some();
        removed
    }

    /// Whether anything was changed since the batch started.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Publish the batch as the next generation and rebuild the tree.
    pub fn commit(self) -> u64 {
        let snapshot = StoreSnapshot {
            generation: self.generation + 1,
            records: self.records,
        };
        self.store.publish(snapshot)
    }

    /// Discard the batch.
    pub fn abort(self) {
        debug!(generation = self.generation, "store mutation discarded");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lodestar_core::TorrentStatus;
    use lodestar_test_support::fixtures::{file, movie, record};

    use super::*;

    fn store() -> anyhow::Result<TorrentStore> {
        Ok(TorrentStore::new(
            Arc::new(TreePolicy::default()),
            Metrics::new()?,
        ))
    }

    fn finished(id: &str) -> TorrentRecord {
        record(
            id,
            id,
            TorrentStatus::Downloaded,
            vec![file(1, &format!("/{id}.mkv"), 10, true)],
        )
    }

    #[tokio::test]
    async fn commit_publishes_generation_and_tree() -> anyhow::Result<()> {
        let store = store()?;
        let mut trees = store.subscribe_tree();
        assert_eq!(store.snapshot().generation, 0);

        let mut mutation = store.begin_mutation().await;
        mutation.put(finished("A"));
        mutation.put(finished("B"));
        assert!(store.snapshot().is_empty());
        assert_eq!(mutation.commit(), 1);

        trees.changed().await?;
        let tree = trees.borrow_and_update().clone();
        assert_eq!(tree.generation, 1);
        assert_eq!(tree.file_count(), 2);
        assert_eq!(store.snapshot().len(), 2);
        assert_eq!(store.metrics.snapshot().torrents_cached, 2);
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_subscribers_see_each_commit() -> anyhow::Result<()> {
        let store = store()?;
        let mut snapshots = store.subscribe_snapshots();
        assert_eq!(snapshots.borrow_and_update().generation, 0);

        let mut mutation = store.begin_mutation().await;
        mutation.put(finished("A"));
        mutation.commit();

        snapshots.changed().await?;
        let published = snapshots.borrow_and_update().clone();
        assert_eq!(published.generation, 1);
        assert!(published.get("A").is_some());

        store.begin_mutation().await.abort();
        assert!(!snapshots.has_changed()?);
        Ok(())
    }

    #[tokio::test]
    async fn dropped_mutation_changes_nothing() -> anyhow::Result<()> {
        let store = store()?;
        {
            let mut mutation = store.begin_mutation().await;
            mutation.put(finished("A"));
        }
        let mut mutation = store.begin_mutation().await;
        mutation.put(finished("B"));
        mutation.abort();

        assert_eq!(store.snapshot().generation, 0);
        assert!(store.snapshot().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot_across_commits() -> anyhow::Result<()> {
        let store = store()?;
        let mut mutation = store.begin_mutation().await;
        mutation.put(finished("A"));
        mutation.commit();

        let held = store.snapshot();
        let held_tree = store.tree();
        let mut mutation = store.begin_mutation().await;
        assert!(mutation.remove("A").is_some());
        assert!(mutation.remove("A").is_none());
        mutation.commit();

        assert_eq!(held.generation, 1);
        assert!(held.get("A").is_some());
        assert_eq!(held_tree.file_count(), 1);
        assert_eq!(store.tree().file_count(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn second_writer_waits_for_the_first() -> anyhow::Result<()> {
        let store = Arc::new(store()?);
        let mutation = store.begin_mutation().await;

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut second = store.begin_mutation().await;
                second.put(TorrentRecord::from_detail(
                    &movie("B", "b"),
                    lodestar_test_support::fixtures::fixed_time(),
                ));
                second.commit()
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        mutation.commit();
        assert_eq!(waiter.await?, 2);
        Ok(())
    }
}
