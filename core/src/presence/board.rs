// Presence board - owned id -> status map for the fetch-based feed
//
// Snapshots are applied last-write-wins by request sequence, and every applied
// snapshot bumps a version counter so consumers can detect new data without
// comparing maps.

use crate::presence::PresenceItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{watch, RwLock};
use tracing::debug;

/// How a new snapshot combines with the previous one
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// The snapshot becomes the whole map
    #[default]
    Replace,
    /// Snapshot entries overwrite, absent ids are kept
    Merge,
}

#[derive(Default)]
struct BoardInner {
    items: HashMap<String, PresenceItem>,
    last_seq: Option<u64>,
}

pub struct PresenceBoard {
    inner: RwLock<BoardInner>,
    seq: AtomicU64,
    version: watch::Sender<u64>,
}

impl PresenceBoard {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: RwLock::new(BoardInner::default()),
            seq: AtomicU64::new(0),
            version,
        }
    }

    /// Sequence number for the next outgoing request
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply a snapshot fetched by request `seq`. Responses older than the
    /// last applied one are discarded; returns whether the snapshot was applied.
    pub async fn apply(&self, seq: u64, items: Vec<PresenceItem>, mode: MergeMode) -> bool {
        let mut inner = self.inner.write().await;
        if inner.last_seq.is_some_and(|last| seq <= last) {
            debug!(target: "presence", seq, "Discarding out-of-order presence snapshot");
            return false;
        }
        inner.last_seq = Some(seq);

        if mode == MergeMode::Replace {
            inner.items.clear();
        }
        for item in items {
            inner.items.insert(item.node_id.clone(), item);
        }
        drop(inner);

        self.version.send_modify(|v| *v += 1);
        true
    }

    pub async fn get(&self, node_id: &str) -> Option<PresenceItem> {
        self.inner.read().await.items.get(node_id).cloned()
    }

    /// All entries, sorted by node id
    pub async fn all(&self) -> Vec<PresenceItem> {
        let inner = self.inner.read().await;
        let mut items: Vec<PresenceItem> = inner.items.values().cloned().collect();
        items.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        items
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.items.len()
    }

    /// Monotonically increasing count of applied snapshots
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Wake up whenever a new snapshot lands
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

impl Default for PresenceBoard {
    fn default() -> Self {
        Self::new()
    }
}
