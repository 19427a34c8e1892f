// Dashboard module - HTTP surface for the diagram and presence views
//
// Serves the annotated pipe network, layout persistence and presence (polled
// snapshots, heartbeats and an SSE stream) to the frontends.

mod api;

pub use api::{router, DashboardServer, DashboardState, DiagramView, NodeView, PresenceView};

/// Dashboard configuration
#[derive(Clone, Debug)]
pub struct DashboardConfig {
    pub port: u16,
    pub host: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            port: 3030,
            host: "127.0.0.1".to_string(),
        }
    }
}

impl DashboardConfig {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("AQUANET_DASHBOARD_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3030),
            host: std::env::var("AQUANET_DASHBOARD_HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
