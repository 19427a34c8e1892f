/// Backend REST client
///
/// Fetches graph snapshots, tank/pump telemetry and presence from the
/// infrastructure backend. Every request is scoped by the configured
/// `org_id` / `location_id`.
use crate::config::ApiConfig;
use crate::graph::{EdgeLink, Graph, RawNode};
use crate::presence::{PresenceReport, PresenceSource};
use crate::{AquanetError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const BODY_SNIPPET_CHARS: usize = 200;

/// Graph payload as served by `GET /graph`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub edges: Vec<EdgeLink>,
}

impl GraphSnapshot {
    /// Validate nodes and build the graph; invalid nodes are dropped
    pub fn into_graph(self) -> Graph {
        Graph::from_raw(self.nodes, self.edges)
    }
}

/// Latest reading for one tank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankStatus {
    #[serde(alias = "id", alias = "node_id")]
    pub tank_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "level")]
    pub level_pct: Option<f64>,
    #[serde(default)]
    pub volume_m3: Option<f64>,
    #[serde(default, alias = "capacity")]
    pub capacity_m3: Option<f64>,
    #[serde(default, alias = "ts")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Latest reading for one pump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpReading {
    #[serde(alias = "id", alias = "node_id")]
    pub pump_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "flow")]
    pub flow_lps: Option<f64>,
    #[serde(default, alias = "pressure")]
    pub pressure_bar: Option<f64>,
    #[serde(default, alias = "ts")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Inclusive time window forwarded as `from` / `to`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// The window ending now
    pub fn last(window: chrono::Duration) -> Self {
        let to = Utc::now();
        Self {
            from: to - window,
            to,
        }
    }

    fn query(&self) -> [(&'static str, String); 2] {
        [("from", self.from.to_rfc3339()), ("to", self.to.to_rfc3339())]
    }
}

// The presence endpoint has served both a bare array and a wrapped one
#[derive(Deserialize)]
#[serde(untagged)]
enum PresencePayload {
    List(Vec<PresenceReport>),
    Wrapped { items: Vec<PresenceReport> },
}

pub struct BackendClient {
    config: ApiConfig,
    http_client: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: ApiConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(&config.user_agent)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn scope(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(org) = &self.config.org_id {
            query.push(("org_id", org.clone()));
        }
        if let Some(location) = &self.config.location_id {
            query.push(("location_id", location.clone()));
        }
        query
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        range: Option<&TimeRange>,
    ) -> Result<T> {
        let url = self.url(path);
        let mut query = self.scope();
        if let Some(range) = range {
            query.extend(range.query());
        }
        debug!(target: "backend", url = %url, "GET");

        let response = self
            .http_client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "backend", url = %url, error = %e, "Request failed");
                AquanetError::Transport(format!("GET {} failed: {}", path, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(target: "backend", url = %url, status = %status, "Backend returned error");
            return Err(AquanetError::Http {
                status: status.as_u16(),
                body: body.chars().take(BODY_SNIPPET_CHARS).collect(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AquanetError::Transport(format!("reading {} failed: {}", path, e)))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            warn!(target: "backend", url = %url, error = %e, "Failed to decode response");
            AquanetError::InvalidPayload(format!("{}: {}", path, e))
        })
    }

    /// `GET /graph`, falling back to `/graph/nodes` + `/graph/edges` on 404
    pub async fn graph(&self) -> Result<GraphSnapshot> {
        match self.get_json::<GraphSnapshot>("/graph", None).await {
            Err(AquanetError::Http { status: 404, .. }) => {
                debug!(target: "backend", "No combined graph endpoint; fetching nodes and edges");
                let (nodes, edges) = tokio::try_join!(self.graph_nodes(), self.graph_edges())?;
                Ok(GraphSnapshot { nodes, edges })
            }
            other => other,
        }
    }

    pub async fn graph_nodes(&self) -> Result<Vec<RawNode>> {
        self.get_json("/graph/nodes", None).await
    }

    pub async fn graph_edges(&self) -> Result<Vec<EdgeLink>> {
        self.get_json("/graph/edges", None).await
    }

    pub async fn tank_status(&self, range: Option<&TimeRange>) -> Result<Vec<TankStatus>> {
        self.get_json("/tanks/status", range).await
    }

    pub async fn pump_latest(&self, range: Option<&TimeRange>) -> Result<Vec<PumpReading>> {
        self.get_json("/pumps/latest", range).await
    }

    pub async fn presence(&self) -> Result<Vec<PresenceReport>> {
        let payload: PresencePayload = self.get_json("/conn/simple", None).await?;
        Ok(match payload {
            PresencePayload::List(items) | PresencePayload::Wrapped { items } => items,
        })
    }
}

#[async_trait]
impl PresenceSource for BackendClient {
    async fn fetch_presence(&self) -> Result<Vec<PresenceReport>> {
        self.presence().await
    }
}
