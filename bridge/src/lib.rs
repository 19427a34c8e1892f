use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use aquanet_core::dashboard::{DashboardServer, DashboardState};
use aquanet_core::layout::{FileStore, KeyValueStore, MemoryStore};
use aquanet_core::presence::{PollerHandle, PresenceBroadcaster, PresenceSource};
use aquanet_core::{
    AquanetError, BackendClient, Graph, HeartbeatTracker, LayoutStore, MonitorConfig,
    PresenceBoard, PresencePoller, ScenarioCatalog,
};

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Core(#[from] AquanetError),
    #[error("server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Wires the backend client, presence feeds and dashboard into one service
pub struct Bridge {
    config: MonitorConfig,
    client: Arc<BackendClient>,
    state: DashboardState,
    poller: Option<PollerHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(BackendClient::new(config.api.clone()));
        let scenarios = load_scenarios(config.diagram.scenarios_path.as_deref());

        let store: Arc<dyn KeyValueStore> = match FileStore::new(&config.layout.dir) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!(target: "bridge", error = %e, "Layout directory unavailable; layout will not survive restarts");
                Arc::new(MemoryStore::new())
            }
        };
        let layout = LayoutStore::with_key(store, config.layout.key.clone());

        let state = DashboardState::new(
            Arc::new(RwLock::new(Graph::default())),
            Arc::new(scenarios),
            Arc::new(PresenceBoard::new()),
            Arc::new(HeartbeatTracker::new(config.presence.thresholds())),
            PresenceBroadcaster::default(),
            layout,
        );

        Ok(Self {
            config,
            client,
            state,
            poller: None,
            tasks: Vec::new(),
        })
    }

    /// Seed the diagram with a static graph (persisted layout applied on top)
    pub async fn with_graph(self, graph: Graph) -> Self {
        let (nodes, edges) = graph.into_parts();
        apply_snapshot(&self.state, nodes, edges).await;
        self
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Pull the graph from the backend once; returns the node count
    pub async fn refresh_graph(&self) -> Result<usize> {
        refresh_graph(&self.client, &self.state).await
    }

    /// Spawn graph refresh, presence polling and the heartbeat ticker
    pub fn start_background(&mut self) {
        if self.poller.is_some() {
            return;
        }

        let source: Arc<dyn PresenceSource> = self.client.clone();
        let poller = PresencePoller::new(source, Arc::clone(&self.state.presence))
            .with_interval(Duration::from_millis(self.config.presence.poll_interval_ms))
            .with_mode(self.config.presence.merge_mode)
            .with_thresholds(self.config.presence.thresholds());
        self.poller = Some(poller.start());

        let ticker = Arc::clone(&self.state.tracker).spawn_ticker(
            Duration::from_millis(self.config.presence.tick_interval_ms),
            self.state.broadcaster.clone(),
        );
        self.tasks.push(ticker);

        let client = Arc::clone(&self.client);
        let state = self.state.clone();
        let period = Duration::from_millis(self.config.diagram.graph_refresh_ms);
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                // On failure the previous graph stays on screen
                if let Err(e) = refresh_graph(&client, &state).await {
                    warn!(target: "bridge", error = %e, "Graph refresh failed; keeping stale graph");
                }
            }
        }));

        info!(target: "bridge", "Background tasks started");
    }

    /// Start everything and serve the dashboard until the server stops
    pub async fn run(mut self) -> Result<()> {
        self.start_background();
        let server = DashboardServer::new(self.config.dashboard.clone(), self.state.clone());
        info!(target: "bridge", addr = %self.config.dashboard.addr(), api = %self.config.api.base_url, "Starting AquaNet bridge");
        server
            .serve()
            .await
            .map_err(|e| BridgeError::Server(e.to_string()))
    }

    pub fn shutdown(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn refresh_graph(client: &BackendClient, state: &DashboardState) -> Result<usize> {
    let snapshot = client.graph().await?;
    let (nodes, edges) = snapshot.into_graph().into_parts();
    Ok(apply_snapshot(state, nodes, edges).await)
}

async fn apply_snapshot(
    state: &DashboardState,
    nodes: Vec<aquanet_core::Node>,
    edges: Vec<aquanet_core::EdgeLink>,
) -> usize {
    for node in &nodes {
        state.tracker.register(&node.id);
    }
    let mut graph = state.graph.write().await;
    graph.refresh(nodes, Some(edges));
    // Persisted drags win over backend positions
    if let Some(layout) = state.layout.load() {
        graph.apply_layout(&layout);
    }
    info!(target: "bridge", nodes = graph.len(), edges = graph.edges().len(), "Graph updated");
    graph.len()
}

fn load_scenarios(path: Option<&Path>) -> ScenarioCatalog {
    let Some(path) = path else {
        return ScenarioCatalog::new();
    };
    let parsed = std::fs::read_to_string(path)
        .map_err(AquanetError::from)
        .and_then(|s| ScenarioCatalog::from_json(&s));
    match parsed {
        Ok(catalog) => {
            info!(target: "bridge", path = %path.display(), scenarios = catalog.len(), "Scenarios loaded");
            catalog
        }
        Err(e) => {
            warn!(target: "bridge", path = %path.display(), error = %e, "Failed to load scenarios; showing full network only");
            ScenarioCatalog::new()
        }
    }
}
