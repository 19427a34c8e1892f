// Scenario / edge activation resolver
//
// Annotates base edges with a pipe size and an `active` flag. With no scenario
// every edge is active, so the full network shows by default.

use crate::graph::model::EdgeLink;
use crate::graph::routing::orthogonal_path;
use crate::graph::PositionLookup;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{trace, warn};

/// Scenario name reserved for backend-driven (dynamic) activation
pub const DYNAMIC_SCENARIO: &str = "dynamic";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipeSize {
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "G")]
    Gravity,
}

impl PipeSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipeSize::Eight => "8",
            PipeSize::Ten => "10",
            PipeSize::Gravity => "G",
        }
    }
}

/// Gravity lines win over any priority; otherwise priority 10 or 8 maps to a
/// pipe size and everything else is unclassified.
pub fn classify_pipe(relation: Option<&str>, priority: Option<i64>) -> Option<PipeSize> {
    let gravity = relation.is_some_and(|r| {
        let r = r.to_lowercase();
        r.contains("gravity") || r.contains("gravedad")
    });
    if gravity {
        return Some(PipeSize::Gravity);
    }
    match priority {
        Some(10) => Some(PipeSize::Ten),
        Some(8) => Some(PipeSize::Eight),
        _ => None,
    }
}

/// A named operating mode: the set of edge keys that carry flow
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub active_keys: BTreeSet<String>,
}

impl Scenario {
    pub fn new<I, K>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            name: name.into(),
            active_keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.active_keys.contains(key)
    }
}

/// Named scenarios available to the diagram
#[derive(Clone, Debug, Default)]
pub struct ScenarioCatalog {
    scenarios: BTreeMap<String, Scenario>,
}

impl ScenarioCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `{ "name": ["a>b", ...], ... }`
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for (name, keys) in raw {
            catalog.insert(Scenario::new(name, keys));
        }
        Ok(catalog)
    }

    /// Add a scenario. The reserved dynamic name is refused, since a query
    /// for it always selects dynamic activation.
    pub fn insert(&mut self, scenario: Scenario) -> bool {
        if scenario.name.eq_ignore_ascii_case(DYNAMIC_SCENARIO) {
            warn!(target: "graph", name = %scenario.name, "Scenario name is reserved; skipping");
            return false;
        }
        self.scenarios.insert(scenario.name.clone(), scenario);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.scenarios.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

/// Where the `active` flag comes from
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Activation {
    /// No scenario selected: every edge is active
    #[default]
    All,
    /// Active iff the edge key is in the scenario
    Scenario(Scenario),
    /// Per-edge flow flag from the backend; a missing flag is inactive
    Dynamic,
}

/// An edge annotated for rendering
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub a: String,
    pub b: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipe: Option<PipeSize>,
    pub active: bool,
}

impl Edge {
    pub fn key(&self) -> String {
        crate::graph::edge_key(&self.a, &self.b)
    }
}

pub fn resolve_edges(edges: &[EdgeLink], activation: &Activation) -> Vec<Edge> {
    edges
        .iter()
        .map(|e| {
            let active = match activation {
                Activation::All => true,
                Activation::Scenario(s) => s.contains(&e.key()),
                Activation::Dynamic => e.flowing.unwrap_or(false),
            };
            Edge {
                a: e.a.clone(),
                b: e.b.clone(),
                pipe: classify_pipe(e.relation.as_deref(), e.priority),
                active,
            }
        })
        .collect()
}

/// Memoizes `resolve_edges` on its inputs.
///
/// Keeps the most recently used results so clients switching between a few
/// scenarios hit the cache; the least recently used entry is evicted first.
#[derive(Debug)]
pub struct EdgeResolver {
    cached: VecDeque<(u64, Arc<[Edge]>)>,
    capacity: usize,
    computations: u64,
}

pub const DEFAULT_RESOLVER_CAPACITY: usize = 8;

impl Default for EdgeResolver {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RESOLVER_CAPACITY)
    }
}

impl EdgeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            cached: VecDeque::with_capacity(capacity),
            capacity,
            computations: 0,
        }
    }

    pub fn resolve(&mut self, edges: &[EdgeLink], activation: &Activation) -> Arc<[Edge]> {
        let fingerprint = Self::fingerprint(edges, activation);
        if let Some(pos) = self.cached.iter().position(|(fp, _)| *fp == fingerprint) {
            if let Some(hit) = self.cached.remove(pos) {
                let resolved = Arc::clone(&hit.1);
                self.cached.push_back(hit);
                return resolved;
            }
        }
        trace!(target: "graph", edges = edges.len(), "Resolving edge activation");
        let resolved: Arc<[Edge]> = resolve_edges(edges, activation).into();
        if self.cached.len() == self.capacity {
            self.cached.pop_front();
        }
        self.cached.push_back((fingerprint, Arc::clone(&resolved)));
        self.computations += 1;
        resolved
    }

    /// Number of times the resolver actually recomputed
    pub fn computations(&self) -> u64 {
        self.computations
    }

    /// Results currently held
    pub fn cached_len(&self) -> usize {
        self.cached.len()
    }

    fn fingerprint(edges: &[EdgeLink], activation: &Activation) -> u64 {
        let mut hasher = DefaultHasher::new();
        edges.hash(&mut hasher);
        activation.hash(&mut hasher);
        hasher.finish()
    }
}

/// A renderable edge: annotation plus routed path
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeView {
    pub key: String,
    pub a: String,
    pub b: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipe: Option<PipeSize>,
    pub active: bool,
    pub path: String,
}

/// Route resolved edges; edges with an unresolvable endpoint are omitted.
pub fn diagram_edges<L>(lookup: &L, edges: &[Edge]) -> Vec<EdgeView>
where
    L: PositionLookup + ?Sized,
{
    edges
        .iter()
        .filter_map(|e| {
            let path = orthogonal_path(lookup, &e.a, &e.b);
            if path.is_empty() {
                return None;
            }
            Some(EdgeView {
                key: e.key(),
                a: e.a.clone(),
                b: e.b.clone(),
                pipe: e.pipe,
                active: e.active,
                path,
            })
        })
        .collect()
}
