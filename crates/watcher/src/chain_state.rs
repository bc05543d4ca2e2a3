// Path: crates/watcher/src/chain_state.rs
//! Latest observed chain progress per node.
//!
//! Written by the decoder task with narrow per-update write locks, read by every
//! group monitor through [`ChainStateStore::snapshot`]. Heights only ever move
//! forward: a lower observation is discarded.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use telewatch_telemetry::metrics;

/// Imported and finalized heights of one node. Absent nodes read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeHeights {
    /// Best imported block height.
    pub imported: u64,
    /// Best finalized block height.
    pub finalized: u64,
}

/// Point-in-time heights for a set of nodes, taken for one monitoring cycle.
#[derive(Debug, Clone, Default)]
pub struct ChainSnapshot {
    heights: HashMap<String, NodeHeights>,
}

impl ChainSnapshot {
    /// Heights of `node`, zero if the feed never reported it.
    pub fn get(&self, node: &str) -> NodeHeights {
        self.heights.get(node).copied().unwrap_or_default()
    }
}

/// Thread-safe store of chain progress keyed by node name, plus the live node gauge.
#[derive(Debug, Default)]
pub struct ChainStateStore {
    imported: RwLock<HashMap<String, u64>>,
    finalized: RwLock<HashMap<String, u64>>,
    node_count: AtomicI64,
}

fn raise(map: &RwLock<HashMap<String, u64>>, node: &str, height: u64) -> bool {
    let mut map = map.write();
    match map.get_mut(node) {
        Some(current) if *current >= height => false,
        Some(current) => {
            *current = height;
            true
        }
        None => {
            map.insert(node.to_string(), height);
            true
        }
    }
}

impl ChainStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an imported height. Returns false if it did not advance the node.
    pub fn record_imported(&self, node: &str, height: u64) -> bool {
        raise(&self.imported, node, height)
    }

    /// Records a finalized height. Returns false if it did not advance the node.
    pub fn record_finalized(&self, node: &str, height: u64) -> bool {
        raise(&self.finalized, node, height)
    }

    /// Current heights of a single node.
    pub fn heights(&self, node: &str) -> NodeHeights {
        NodeHeights {
            imported: self.imported.read().get(node).copied().unwrap_or(0),
            finalized: self.finalized.read().get(node).copied().unwrap_or(0),
        }
    }

    /// Copies the heights of `nodes`.
    ///
    /// Each map's read lock is held across the whole scan so every node in the
    /// group is read from the same version of that map. The two locks are never
    /// held together.
    pub fn snapshot<'a, I>(&self, nodes: I) -> ChainSnapshot
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        let mut heights: HashMap<String, NodeHeights> = HashMap::new();
        {
            let imported = self.imported.read();
            for node in nodes.clone() {
                let entry = heights.entry(node.to_string()).or_default();
                entry.imported = imported.get(node).copied().unwrap_or(0);
            }
        }
        {
            let finalized = self.finalized.read();
            for node in nodes {
                let entry = heights.entry(node.to_string()).or_default();
                entry.finalized = finalized.get(node).copied().unwrap_or(0);
            }
        }
        ChainSnapshot { heights }
    }

    /// Counts a node joining the feed.
    pub fn node_added(&self) {
        let count = self.node_count.fetch_add(1, Ordering::AcqRel) + 1;
        metrics().set_tracked_nodes(count);
    }

    /// Counts a node leaving the feed. Never drops below zero.
    pub fn node_removed(&self) {
        let previous = self
            .node_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some((n - 1).max(0)))
            .unwrap_or(0);
        metrics().set_tracked_nodes((previous - 1).max(0));
    }

    /// Zeroes the node gauge. Called when the feed connection is lost.
    pub fn reset_node_count(&self) {
        self.node_count.store(0, Ordering::Release);
        metrics().set_tracked_nodes(0);
    }

    /// Number of nodes currently reported by the feed.
    pub fn node_count(&self) -> i64 {
        self.node_count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_heights_never_regress() {
        let store = ChainStateStore::new();
        assert!(store.record_imported("alpha", 100));
        assert!(!store.record_imported("alpha", 90));
        assert!(!store.record_imported("alpha", 100));
        assert!(store.record_finalized("alpha", 98));
        assert!(!store.record_finalized("alpha", 10));
        assert_eq!(
            store.heights("alpha"),
            NodeHeights {
                imported: 100,
                finalized: 98
            }
        );
    }

    #[test]
    fn test_absent_node_reads_zero() {
        let store = ChainStateStore::new();
        store.record_imported("alpha", 5);
        let snapshot = store.snapshot(["alpha", "beta"]);
        assert_eq!(snapshot.get("alpha").imported, 5);
        assert_eq!(snapshot.get("alpha").finalized, 0);
        assert_eq!(snapshot.get("beta"), NodeHeights::default());
        assert_eq!(snapshot.get("never-asked"), NodeHeights::default());
    }

    #[test]
    fn test_node_count_saturates_and_resets() {
        let store = ChainStateStore::new();
        store.node_removed();
        assert_eq!(store.node_count(), 0);
        store.node_added();
        store.node_added();
        store.node_removed();
        assert_eq!(store.node_count(), 1);
        store.reset_node_count();
        assert_eq!(store.node_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writers_keep_maximum() {
        let store = Arc::new(ChainStateStore::new());
        let mut handles = Vec::new();
        for worker in 0..8u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for height in 0..500u64 {
                    store.record_imported("alpha", height * 8 + worker);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.heights("alpha").imported, 499 * 8 + 7);
    }
}
