// Graph module - Pipe network diagram model
//
// Nodes (tanks, pumps, valves, manifolds) and the pipes between them, plus the
// pure helpers the diagram needs: dimensions, orthogonal routing and scenario
// based edge activation.

mod dimensions;
mod model;
mod routing;
mod scenario;

pub use dimensions::{node_half_size, HalfSize, FALLBACK_HALF_SIZE};
pub use model::{edge_key, EdgeLink, Graph, Node, NodeKind, PumpInfo, RawNode, TankInfo, ValveInfo};
pub use routing::{orthogonal_path, orthogonal_path_between, orthogonal_points};
pub use scenario::{
    classify_pipe, diagram_edges, resolve_edges, Activation, Edge, EdgeResolver, EdgeView,
    PipeSize, Scenario, ScenarioCatalog, DYNAMIC_SCENARIO,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A point in diagram coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Resolves a node id to its current diagram position.
///
/// The router takes this instead of a concrete graph so callers can route
/// against a live graph, a layout snapshot, or a plain map in tests.
pub trait PositionLookup {
    fn position(&self, id: &str) -> Option<Point>;
}

impl PositionLookup for Graph {
    fn position(&self, id: &str) -> Option<Point> {
        Graph::position(self, id)
    }
}

impl PositionLookup for HashMap<String, Point> {
    fn position(&self, id: &str) -> Option<Point> {
        self.get(id).copied()
    }
}
