// Node/edge model for the pipe network
//
// Backend payloads are flat JSON records with a `type` label and a handful of
// optional per-type fields. They are validated into `Node` at the boundary so
// the rest of the crate works with one tagged schema.

use crate::graph::dimensions::{node_half_size, HalfSize};
use crate::graph::Point;
use crate::layout::{import_layout, NodePos};
use crate::AquanetError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A physical asset rendered as a diagram vertex
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub kind: NodeKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Tank(TankInfo),
    Pump(PumpInfo),
    Valve(ValveInfo),
    Manifold,
    /// Any type label the diagram has no dedicated rendering for
    Other(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TankInfo {
    /// Fill level in percent
    pub level: Option<f64>,
    /// Capacity in cubic meters
    pub capacity: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PumpInfo {
    pub status: Option<String>,
    /// Flow in liters per second
    pub flow: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValveInfo {
    pub state: Option<String>,
}

impl NodeKind {
    /// Parse a type label, case-insensitively
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "tank" => NodeKind::Tank(TankInfo::default()),
            "pump" => NodeKind::Pump(PumpInfo::default()),
            "valve" => NodeKind::Valve(ValveInfo::default()),
            "manifold" => NodeKind::Manifold,
            other => NodeKind::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            NodeKind::Tank(_) => "tank",
            NodeKind::Pump(_) => "pump",
            NodeKind::Valve(_) => "valve",
            NodeKind::Manifold => "manifold",
            NodeKind::Other(label) => label,
        }
    }
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, x: f64, y: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            x,
            y,
            kind,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn half_size(&self) -> HalfSize {
        node_half_size(Some(self.kind.label()))
    }

    /// Hit-test a point against the node's box (edges inclusive)
    pub fn contains(&self, point: Point) -> bool {
        let half = self.half_size();
        (point.x - self.x).abs() <= half.half_w && (point.y - self.y).abs() <= half.half_h
    }
}

/// Flat wire form of a node
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawNode {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl TryFrom<RawNode> for Node {
    type Error = AquanetError;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let id = raw.id.trim().to_string();
        if id.is_empty() {
            return Err(AquanetError::InvalidPayload("node id is empty".into()));
        }
        if !raw.x.is_finite() || !raw.y.is_finite() {
            return Err(AquanetError::InvalidPayload(format!(
                "node {} has a non-finite position",
                id
            )));
        }

        let kind = match NodeKind::from_label(raw.kind.as_deref().unwrap_or("")) {
            NodeKind::Tank(_) => {
                if let Some(level) = raw.level {
                    if !(0.0..=100.0).contains(&level) {
                        return Err(AquanetError::InvalidPayload(format!(
                            "tank {} level {} outside 0..=100",
                            id, level
                        )));
                    }
                }
                if raw.capacity.is_some_and(|c| c < 0.0) {
                    return Err(AquanetError::InvalidPayload(format!(
                        "tank {} has a negative capacity",
                        id
                    )));
                }
                NodeKind::Tank(TankInfo {
                    level: raw.level,
                    capacity: raw.capacity,
                })
            }
            NodeKind::Pump(_) => NodeKind::Pump(PumpInfo {
                status: raw.status,
                flow: raw.flow,
            }),
            NodeKind::Valve(_) => NodeKind::Valve(ValveInfo { state: raw.state }),
            other => other,
        };

        Ok(Node {
            name: raw.name.filter(|n| !n.is_empty()).unwrap_or_else(|| id.clone()),
            id,
            x: raw.x,
            y: raw.y,
            kind,
        })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        let mut raw = RawNode {
            id: node.id,
            kind: Some(node.kind.label().to_string()),
            name: Some(node.name),
            x: node.x,
            y: node.y,
            ..Default::default()
        };
        match node.kind {
            NodeKind::Tank(t) => {
                raw.level = t.level;
                raw.capacity = t.capacity;
            }
            NodeKind::Pump(p) => {
                raw.status = p.status;
                raw.flow = p.flow;
            }
            NodeKind::Valve(v) => raw.state = v.state,
            NodeKind::Manifold | NodeKind::Other(_) => {}
        }
        raw
    }
}

/// Identity of an edge: the ordered pair `"a>b"`
pub fn edge_key(a: &str, b: &str) -> String {
    format!("{}>{}", a, b)
}

/// A directed pipe between two nodes, before scenario annotation
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "EdgeWire")]
pub struct EdgeLink {
    pub a: String,
    pub b: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Flow flag reported by the backend, used by dynamic activation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flowing: Option<bool>,
}

impl EdgeLink {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            relation: None,
            priority: None,
            flowing: None,
        }
    }

    /// Parse an `"a>b"` key
    pub fn from_key(key: &str) -> Option<Self> {
        let (a, b) = key.split_once('>')?;
        let (a, b) = (a.trim(), b.trim());
        if a.is_empty() || b.is_empty() {
            return None;
        }
        Some(Self::new(a, b))
    }

    pub fn key(&self) -> String {
        edge_key(&self.a, &self.b)
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_flowing(mut self, flowing: bool) -> Self {
        self.flowing = Some(flowing);
        self
    }
}

// Edges arrive either as bare "a>b" keys (static tables) or as objects whose
// field names vary between backend versions.
#[derive(Deserialize)]
#[serde(untagged)]
enum EdgeWire {
    Key(String),
    Link(LinkWire),
}

#[derive(Deserialize)]
struct LinkWire {
    #[serde(alias = "src", alias = "from")]
    a: String,
    #[serde(alias = "dst", alias = "to")]
    b: String,
    #[serde(default)]
    relation: Option<String>,
    #[serde(default, alias = "prioridad", deserialize_with = "lenient_priority")]
    priority: Option<i64>,
    #[serde(default, alias = "active")]
    flowing: Option<bool>,
}

impl From<EdgeWire> for EdgeLink {
    fn from(wire: EdgeWire) -> Self {
        match wire {
            // A malformed key becomes a dangling edge, which renders as nothing
            EdgeWire::Key(key) => {
                EdgeLink::from_key(&key).unwrap_or_else(|| EdgeLink::new(key, String::new()))
            }
            EdgeWire::Link(l) => EdgeLink {
                a: l.a,
                b: l.b,
                relation: l.relation,
                priority: l.priority,
                flowing: l.flowing,
            },
        }
    }
}

fn lenient_priority<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// The pipe network: nodes indexed by id plus the edge list
#[derive(Clone, Debug, Default, Serialize)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<EdgeLink>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Graph {
    /// Build a graph; duplicate node ids keep the first occurrence
    pub fn new(nodes: Vec<Node>, edges: Vec<EdgeLink>) -> Self {
        let mut graph = Self {
            nodes: Vec::with_capacity(nodes.len()),
            edges,
            index: HashMap::new(),
        };
        for node in nodes {
            if graph.index.contains_key(&node.id) {
                debug!(target: "graph", node_id = %node.id, "Duplicate node id ignored");
                continue;
            }
            graph.index.insert(node.id.clone(), graph.nodes.len());
            graph.nodes.push(node);
        }
        graph
    }

    /// Build from wire records, dropping the ones that fail validation
    pub fn from_raw(raw: Vec<RawNode>, edges: Vec<EdgeLink>) -> Self {
        let nodes = raw
            .into_iter()
            .filter_map(|r| match Node::try_from(r) {
                Ok(node) => Some(node),
                Err(e) => {
                    warn!(target: "graph", error = %e, "Dropping invalid node");
                    None
                }
            })
            .collect();
        Self::new(nodes, edges)
    }

    pub fn into_parts(self) -> (Vec<Node>, Vec<EdgeLink>) {
        (self.nodes, self.edges)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeLink] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn by_id(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn position(&self, id: &str) -> Option<Point> {
        self.by_id(id).map(Node::position)
    }

    /// Layout drag. Returns false when the id is unknown.
    pub fn move_node(&mut self, id: &str, x: f64, y: f64) -> bool {
        match self.index.get(id) {
            Some(&i) => {
                self.nodes[i].x = x;
                self.nodes[i].y = y;
                true
            }
            None => false,
        }
    }

    /// Apply a backend snapshot. Nodes are upserted by id and never removed
    /// during a session; the edge list is replaced when the snapshot has one.
    pub fn refresh(&mut self, nodes: Vec<Node>, edges: Option<Vec<EdgeLink>>) {
        for node in nodes {
            match self.index.get(&node.id) {
                Some(&i) => self.nodes[i] = node,
                None => {
                    self.index.insert(node.id.clone(), self.nodes.len());
                    self.nodes.push(node);
                }
            }
        }
        if let Some(edges) = edges {
            self.edges = edges;
        }
        let dangling = self.dangling_edges().len();
        if dangling > 0 {
            debug!(target: "graph", dangling, "Edges reference unknown nodes");
        }
    }

    /// Overwrite positions from a persisted layout
    pub fn apply_layout(&mut self, layout: &[NodePos]) {
        // import_layout keeps order, so the index stays valid
        self.nodes = import_layout(std::mem::take(&mut self.nodes), layout);
    }

    /// Edges with at least one endpoint missing from the graph
    pub fn dangling_edges(&self) -> Vec<&EdgeLink> {
        self.edges
            .iter()
            .filter(|e| !self.index.contains_key(&e.a) || !self.index.contains_key(&e.b))
            .collect()
    }
}
