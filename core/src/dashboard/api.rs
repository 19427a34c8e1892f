// Dashboard HTTP API server
//
// Provides REST endpoints and SSE streaming for the diagram and presence UIs

use crate::dashboard::DashboardConfig;
use crate::graph::{
    diagram_edges, Activation, EdgeResolver, EdgeView, Graph, Node, ScenarioCatalog,
    DYNAMIC_SCENARIO,
};
use crate::layout::{export_layout, LayoutStore, NodePos};
use crate::presence::{HeartbeatTracker, PresenceBoard, PresenceBroadcaster, PresenceItem};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

/// Shared state behind every handler
#[derive(Clone)]
pub struct DashboardState {
    pub graph: Arc<RwLock<Graph>>,
    pub scenarios: Arc<ScenarioCatalog>,
    pub presence: Arc<PresenceBoard>,
    pub tracker: Arc<HeartbeatTracker>,
    pub broadcaster: PresenceBroadcaster,
    pub layout: LayoutStore,
    resolver: Arc<Mutex<EdgeResolver>>,
}

impl DashboardState {
    pub fn new(
        graph: Arc<RwLock<Graph>>,
        scenarios: Arc<ScenarioCatalog>,
        presence: Arc<PresenceBoard>,
        tracker: Arc<HeartbeatTracker>,
        broadcaster: PresenceBroadcaster,
        layout: LayoutStore,
    ) -> Self {
        Self {
            graph,
            scenarios,
            presence,
            tracker,
            broadcaster,
            layout,
            resolver: Arc::new(Mutex::new(EdgeResolver::new())),
        }
    }
}

/// A node plus the box it occupies on the diagram
#[derive(Clone, Debug, Serialize)]
pub struct NodeView {
    #[serde(flatten)]
    pub node: Node,
    pub half_w: f64,
    pub half_h: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct DiagramView {
    pub scenario: Option<String>,
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
    pub timestamp: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresenceView {
    pub version: u64,
    pub items: Vec<PresenceItem>,
}

/// Error body returned by every handler
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Dashboard HTTP server
pub struct DashboardServer {
    config: DashboardConfig,
    state: DashboardState,
}

impl DashboardServer {
    pub fn new(config: DashboardConfig, state: DashboardState) -> Self {
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Start the Dashboard server
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        self.serve_with_listener(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_with_listener(
        self,
        listener: tokio::net::TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.router();
        info!(
            target: "dashboard",
            url = %format!("http://{}", listener.local_addr()?),
            "Dashboard server ready"
        );

        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Build the dashboard router over `state`
pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/api/graph", get(graph_handler))
        .route("/api/scenarios", get(scenarios_handler))
        .route("/api/nodes/:id/position", patch(move_node_handler))
        .route("/api/layout", get(layout_handler).put(import_layout_handler))
        .route("/api/presence", get(presence_handler))
        .route("/api/presence/stream", get(presence_stream_handler))
        .route("/api/presence/:id", get(presence_item_handler))
        .route("/api/heartbeat", post(heartbeat_handler))
        .route("/api/heartbeats", get(heartbeats_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct GraphQuery {
    #[serde(default)]
    scenario: Option<String>,
}

/// Annotated diagram for a scenario.
/// Query params: ?scenario=<name> or ?scenario=dynamic; none shows every edge active
async fn graph_handler(
    State(state): State<DashboardState>,
    Query(query): Query<GraphQuery>,
) -> Result<Json<DiagramView>, ApiError> {
    let scenario = query.scenario.filter(|s| !s.is_empty());
    let activation = match scenario.as_deref() {
        None => Activation::All,
        Some(DYNAMIC_SCENARIO) => Activation::Dynamic,
        Some(name) => match state.scenarios.get(name) {
            Some(s) => Activation::Scenario(s.clone()),
            None => return Err(ApiError::not_found(format!("unknown scenario: {}", name))),
        },
    };

    let graph = state.graph.read().await;
    let resolved = {
        let mut resolver = state
            .resolver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        resolver.resolve(graph.edges(), &activation)
    };
    let edges = diagram_edges(&*graph, &resolved);
    let nodes = graph
        .nodes()
        .iter()
        .map(|n| {
            let half = n.half_size();
            NodeView {
                node: n.clone(),
                half_w: half.half_w,
                half_h: half.half_h,
            }
        })
        .collect();

    Ok(Json(DiagramView {
        scenario,
        nodes,
        edges,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

async fn scenarios_handler(State(state): State<DashboardState>) -> Json<Vec<String>> {
    Json(state.scenarios.names())
}

#[derive(Deserialize)]
struct PositionBody {
    x: f64,
    y: f64,
}

/// Layout drag: move one node and persist the layout
async fn move_node_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
    Json(body): Json<PositionBody>,
) -> Result<Json<NodePos>, ApiError> {
    if !body.x.is_finite() || !body.y.is_finite() {
        return Err(ApiError::bad_request("position must be finite"));
    }
    let mut graph = state.graph.write().await;
    if !graph.move_node(&id, body.x, body.y) {
        return Err(ApiError::not_found(format!("unknown node: {}", id)));
    }
    state.layout.save(graph.nodes());
    debug!(target: "dashboard", node_id = %id, x = body.x, y = body.y, "Node moved");
    Ok(Json(NodePos::new(id, body.x, body.y)))
}

async fn layout_handler(State(state): State<DashboardState>) -> Json<Vec<NodePos>> {
    let graph = state.graph.read().await;
    Json(export_layout(graph.nodes()))
}

#[derive(Serialize)]
struct LayoutImported {
    nodes: usize,
    persisted: bool,
}

async fn import_layout_handler(
    State(state): State<DashboardState>,
    Json(layout): Json<Vec<NodePos>>,
) -> Json<LayoutImported> {
    let mut graph = state.graph.write().await;
    graph.apply_layout(&layout);
    let persisted = state.layout.save(graph.nodes());
    Json(LayoutImported {
        nodes: graph.len(),
        persisted,
    })
}

async fn presence_handler(State(state): State<DashboardState>) -> Json<PresenceView> {
    // Read the version first so a client never sees items older than it
    let version = state.presence.version();
    let items = state.presence.all().await;
    Json(PresenceView { version, items })
}

/// Polled status first, then the heartbeat tracker
async fn presence_item_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
) -> Result<Json<PresenceItem>, ApiError> {
    if let Some(item) = state.presence.get(&id).await {
        return Ok(Json(item));
    }
    state
        .tracker
        .status_at(&id, Utc::now())
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no presence for node: {}", id)))
}

#[derive(Deserialize)]
struct HeartbeatBody {
    node_id: String,
    #[serde(default)]
    online: Option<bool>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

async fn heartbeat_handler(
    State(state): State<DashboardState>,
    Json(body): Json<HeartbeatBody>,
) -> Result<(StatusCode, Json<PresenceItem>), ApiError> {
    let node_id = body.node_id.trim();
    if node_id.is_empty() {
        return Err(ApiError::bad_request("node_id empty"));
    }
    let now = Utc::now();
    // Only nodes registered from the graph are tracked
    if !state
        .tracker
        .record_known(node_id, body.online, body.timestamp.unwrap_or(now))
    {
        debug!(target: "dashboard", node_id = %node_id, "Heartbeat for unknown node rejected");
        return Err(ApiError::not_found(format!("unknown node: {}", node_id)));
    }
    state.tracker.record_connection(now);

    match state.tracker.status_at(node_id, now) {
        Some(item) => Ok((StatusCode::ACCEPTED, Json(item))),
        None => {
            warn!(target: "dashboard", node_id = %node_id, "Heartbeat not visible after record");
            Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "heartbeat lost".into(),
            })
        }
    }
}

async fn heartbeats_handler(State(state): State<DashboardState>) -> Json<Vec<PresenceItem>> {
    Json(state.tracker.snapshot_at(Utc::now()))
}

/// SSE endpoint for heartbeat ticks
async fn presence_stream_handler(
    State(state): State<DashboardState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    info!(target: "dashboard", "New presence SSE client connected");

    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(update) => match serde_json::to_string(&update) {
            Ok(json) => Some(Ok(Event::default().event("presence").data(json))),
            Err(e) => {
                warn!(target: "dashboard", error = %e, "Failed to serialize presence update");
                None
            }
        },
        Err(e) => {
            warn!(target: "dashboard", error = %e, "Broadcast error");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
