//! Layout persistence
//!
//! Node positions are exported as a flat `{id, x, y}` list and stored under a
//! single versioned key. Storage is best-effort: every failure is logged and
//! swallowed so the diagram keeps working without a persisted layout.

mod store;

pub use store::{FileStore, KeyValueStore, MemoryStore};
#[cfg(feature = "rocksdb")]
pub use store::RocksDbStore;

use crate::graph::Node;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_LAYOUT_KEY: &str = "aquanet.layout.v1";

/// Position override for one node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodePos {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

impl NodePos {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self { id: id.into(), x, y }
    }
}

/// Anything with an id and a movable position
pub trait Placed {
    fn id(&self) -> &str;
    fn xy(&self) -> (f64, f64);
    fn set_xy(&mut self, x: f64, y: f64);
}

impl Placed for Node {
    fn id(&self) -> &str {
        &self.id
    }

    fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    fn set_xy(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }
}

impl Placed for NodePos {
    fn id(&self) -> &str {
        &self.id
    }

    fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    fn set_xy(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }
}

/// Project nodes to their positions
pub fn export_layout<P: Placed>(nodes: &[P]) -> Vec<NodePos> {
    nodes
        .iter()
        .map(|n| {
            let (x, y) = n.xy();
            NodePos::new(n.id(), x, y)
        })
        .collect()
}

/// Overwrite positions of nodes found in `layout`; other nodes pass through
/// and layout entries without a matching node are ignored.
pub fn import_layout<P: Placed>(mut nodes: Vec<P>, layout: &[NodePos]) -> Vec<P> {
    let by_id: HashMap<&str, &NodePos> = layout.iter().map(|p| (p.id.as_str(), p)).collect();
    for node in nodes.iter_mut() {
        if let Some(pos) = by_id.get(node.id()) {
            node.set_xy(pos.x, pos.y);
        }
    }
    nodes
}

/// Layout persistence scoped to one key of a key-value store
#[derive(Clone)]
pub struct LayoutStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl LayoutStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, DEFAULT_LAYOUT_KEY)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persist the layout of `nodes`; returns false if storage failed
    pub fn save<P: Placed>(&self, nodes: &[P]) -> bool {
        save_layout_to_storage(self.store.as_ref(), &self.key, nodes)
    }

    pub fn load(&self) -> Option<Vec<NodePos>> {
        load_layout_from_storage(self.store.as_ref(), &self.key)
    }

    /// Apply the persisted layout to `nodes`, if there is one
    pub fn restore<P: Placed>(&self, nodes: Vec<P>) -> Vec<P> {
        match self.load() {
            Some(layout) => import_layout(nodes, &layout),
            None => nodes,
        }
    }
}

pub fn save_layout_to_storage<P: Placed>(store: &dyn KeyValueStore, key: &str, nodes: &[P]) -> bool {
    let layout = export_layout(nodes);
    let json = match serde_json::to_string(&layout) {
        Ok(json) => json,
        Err(e) => {
            warn!(target: "layout", error = %e, "Failed to encode layout");
            return false;
        }
    };
    match store.put(key, &json) {
        Ok(()) => {
            debug!(target: "layout", key = %key, nodes = layout.len(), "Layout saved");
            true
        }
        Err(e) => {
            warn!(target: "layout", key = %key, error = %e, "Failed to save layout; continuing without persistence");
            false
        }
    }
}

pub fn load_layout_from_storage(store: &dyn KeyValueStore, key: &str) -> Option<Vec<NodePos>> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(target: "layout", key = %key, error = %e, "Failed to read layout");
            return None;
        }
    };
    match serde_json::from_str::<Vec<NodePos>>(&raw) {
        Ok(layout) => Some(layout),
        Err(e) => {
            warn!(target: "layout", key = %key, error = %e, "Stored layout is unreadable");
            None
        }
    }
}
