use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::dashboard::DashboardConfig;
use crate::embed::EmbedMessage;
use crate::presence::{MergeMode, PresenceThresholds};
use crate::{AquanetError, Result};

/// Single configuration surface for the monitor: backend, presence
/// thresholds, layout storage, diagram refresh and the dashboard listener.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub api: ApiConfig,
    pub presence: PresenceConfig,
    pub layout: LayoutConfig,
    pub diagram: DiagramConfig,
    pub dashboard: DashboardConfig,
}

/// Backend REST client configuration
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub org_id: Option<String>,
    pub location_id: Option<String>,
    pub timeout_ms: u64,
    pub user_agent: String,
}

#[derive(Clone, Debug)]
pub struct PresenceConfig {
    pub warn_after_secs: u64,
    pub offline_after_secs: u64,
    pub poll_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub merge_mode: MergeMode,
}

#[derive(Clone, Debug)]
pub struct LayoutConfig {
    pub dir: PathBuf,
    pub key: String,
}

#[derive(Clone, Debug)]
pub struct DiagramConfig {
    pub graph_refresh_ms: u64,
    /// JSON file of `{ scenario: ["a>b", ...] }`
    pub scenarios_path: Option<PathBuf>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: env_string("AQUANET_API_BASE")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            org_id: env_string("AQUANET_ORG_ID"),
            location_id: env_string("AQUANET_LOCATION_ID"),
            timeout_ms: env_parse("AQUANET_REQUEST_TIMEOUT_MS").unwrap_or(10_000),
            user_agent: "aquanet/0.1".to_string(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            warn_after_secs: env_parse("AQUANET_PRESENCE_WARN_SECS").unwrap_or(30),
            offline_after_secs: env_parse("AQUANET_PRESENCE_OFFLINE_SECS").unwrap_or(90),
            poll_interval_ms: env_parse("AQUANET_PRESENCE_POLL_MS").unwrap_or(10_000),
            tick_interval_ms: 1_000,
            merge_mode: MergeMode::Replace,
        }
    }
}

impl PresenceConfig {
    pub fn thresholds(&self) -> PresenceThresholds {
        PresenceThresholds::new(
            Duration::from_secs(self.warn_after_secs),
            Duration::from_secs(self.offline_after_secs),
        )
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            dir: env_string("AQUANET_LAYOUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".aquanet")),
            key: env_string("AQUANET_LAYOUT_KEY")
                .unwrap_or_else(|| crate::layout::DEFAULT_LAYOUT_KEY.to_string()),
        }
    }
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            graph_refresh_ms: env_parse("AQUANET_GRAPH_REFRESH_MS").unwrap_or(30_000),
            scenarios_path: env_string("AQUANET_SCENARIOS").map(PathBuf::from),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            presence: PresenceConfig::default(),
            layout: LayoutConfig::default(),
            diagram: DiagramConfig::default(),
            dashboard: DashboardConfig::from_env(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file (path via AQUANET_CONFIG or ./aquanet.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let path = std::env::var("AQUANET_CONFIG").unwrap_or_else(|_| "aquanet.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Self {
        let default = Self::default();
        if !path.exists() {
            tracing::info!(target: "config", path = %path.display(), "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(path) {
            Ok(s) => match Self::from_toml_str(&s, default.clone()) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(target: "config", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "config", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    /// Overlay a TOML document onto `base`
    pub fn from_toml_str(s: &str, base: Self) -> Result<Self> {
        let overlay: MonitorToml =
            toml::from_str(s).map_err(|e| AquanetError::Config(e.to_string()))?;
        Ok(overlay.overlay(base))
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(AquanetError::Config("api.base_url is empty".into()));
        }
        if self.presence.warn_after_secs >= self.presence.offline_after_secs {
            return Err(AquanetError::Config(format!(
                "presence warn threshold ({}s) must be below offline threshold ({}s)",
                self.presence.warn_after_secs, self.presence.offline_after_secs
            )));
        }
        if self.presence.poll_interval_ms == 0 || self.presence.tick_interval_ms == 0 {
            return Err(AquanetError::Config(
                "presence intervals must be non-zero".into(),
            ));
        }
        if self.diagram.graph_refresh_ms == 0 {
            return Err(AquanetError::Config(
                "diagram.graph_refresh_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Apply runtime configuration injected by an embedding page.
    /// Returns true if anything changed.
    pub fn apply_embed(&mut self, msg: &EmbedMessage) -> bool {
        let EmbedMessage::InfraConfig { api_base, org_id } = msg else {
            return false;
        };
        let mut changed = false;
        if let Some(base) = api_base.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            let base = base.trim_end_matches('/');
            if base != self.api.base_url {
                self.api.base_url = base.to_string();
                changed = true;
            }
        }
        if let Some(org) = org_id {
            if self.api.org_id.as_ref() != Some(org) {
                self.api.org_id = Some(org.clone());
                changed = true;
            }
        }
        changed
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct MonitorToml {
    pub api: Option<ApiToml>,
    pub presence: Option<PresenceToml>,
    pub layout: Option<LayoutToml>,
    pub diagram: Option<DiagramToml>,
    pub dashboard: Option<DashboardToml>,
}

impl MonitorToml {
    fn overlay(self, mut base: MonitorConfig) -> MonitorConfig {
        if let Some(a) = self.api {
            a.apply(&mut base.api);
        }
        if let Some(p) = self.presence {
            p.apply(&mut base.presence);
        }
        if let Some(l) = self.layout {
            l.apply(&mut base.layout);
        }
        if let Some(d) = self.diagram {
            d.apply(&mut base.diagram);
        }
        if let Some(d) = self.dashboard {
            d.apply(&mut base.dashboard);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ApiToml {
    pub base_url: Option<String>,
    pub org_id: Option<String>,
    pub location_id: Option<String>,
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
}
impl ApiToml {
    fn apply(self, a: &mut ApiConfig) {
        if let Some(x) = self.base_url {
            a.base_url = x.trim_end_matches('/').to_string();
        }
        if let Some(x) = self.org_id {
            a.org_id = Some(x);
        }
        if let Some(x) = self.location_id {
            a.location_id = Some(x);
        }
        if let Some(x) = self.timeout_ms {
            a.timeout_ms = x;
        }
        if let Some(x) = self.user_agent {
            a.user_agent = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PresenceToml {
    pub warn_after_secs: Option<u64>,
    pub offline_after_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub tick_interval_ms: Option<u64>,
    pub merge_mode: Option<MergeMode>,
}
impl PresenceToml {
    fn apply(self, p: &mut PresenceConfig) {
        if let Some(x) = self.warn_after_secs {
            p.warn_after_secs = x;
        }
        if let Some(x) = self.offline_after_secs {
            p.offline_after_secs = x;
        }
        if let Some(x) = self.poll_interval_ms {
            p.poll_interval_ms = x;
        }
        if let Some(x) = self.tick_interval_ms {
            p.tick_interval_ms = x;
        }
        if let Some(x) = self.merge_mode {
            p.merge_mode = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct LayoutToml {
    pub dir: Option<PathBuf>,
    pub key: Option<String>,
}
impl LayoutToml {
    fn apply(self, l: &mut LayoutConfig) {
        if let Some(x) = self.dir {
            l.dir = x;
        }
        if let Some(x) = self.key.filter(|k| !k.is_empty()) {
            l.key = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct DiagramToml {
    pub graph_refresh_ms: Option<u64>,
    pub scenarios_path: Option<PathBuf>,
}
impl DiagramToml {
    fn apply(self, d: &mut DiagramConfig) {
        if let Some(x) = self.graph_refresh_ms {
            d.graph_refresh_ms = x;
        }
        if let Some(x) = self.scenarios_path {
            d.scenarios_path = Some(x);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct DashboardToml {
    pub host: Option<String>,
    pub port: Option<u16>,
}
impl DashboardToml {
    fn apply(self, d: &mut DashboardConfig) {
        if let Some(x) = self.host {
            d.host = x;
        }
        if let Some(x) = self.port {
            d.port = x;
        }
    }
}
