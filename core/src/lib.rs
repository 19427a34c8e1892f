// AquaNet Core Library
// Water infrastructure diagram model, presence heuristics and layout persistence

pub mod api;
pub mod config;
pub mod dashboard;
pub mod embed;
pub mod graph;
pub mod layout;
pub mod presence;
pub mod telemetry;

// Export core types
pub use api::{BackendClient, TimeRange};
pub use config::MonitorConfig;
pub use embed::EmbedMessage;
pub use graph::{
    edge_key, node_half_size, orthogonal_path, orthogonal_path_between, Activation, Edge,
    EdgeLink, EdgeResolver, Graph, HalfSize, Node, NodeKind, PipeSize, Point, PositionLookup,
    Scenario, ScenarioCatalog,
};
pub use layout::{export_layout, import_layout, KeyValueStore, LayoutStore, NodePos};
pub use presence::{
    HeartbeatTracker, MergeMode, PresenceBoard, PresenceItem, PresencePoller, PresenceSource,
    PresenceThresholds, Tone,
};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AquanetError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AquanetError>;
