// Presence module - Connectivity heuristics
//
// Derives ok/warn/bad status from heartbeat recency. Two feeds share the same
// classification: a streamed heartbeat tracker and a fetch-based poller that
// writes into an explicitly owned `PresenceBoard`.

mod board;
mod poller;
mod tracker;

pub use board::{MergeMode, PresenceBoard};
pub use poller::{PollerHandle, PresencePoller, PresenceSource};
pub use tracker::{HeartbeatTracker, PresenceBroadcaster, PresenceUpdate, CONNECTION_ID};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_WARN_AFTER: Duration = Duration::from_secs(30);
pub const DEFAULT_OFFLINE_AFTER: Duration = Duration::from_secs(90);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Ok,
    Warn,
    Bad,
}

/// Age thresholds for degrading a node's tone
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresenceThresholds {
    pub warn: Duration,
    pub offline: Duration,
}

impl Default for PresenceThresholds {
    fn default() -> Self {
        Self {
            warn: DEFAULT_WARN_AFTER,
            offline: DEFAULT_OFFLINE_AFTER,
        }
    }
}

impl PresenceThresholds {
    pub fn new(warn: Duration, offline: Duration) -> Self {
        Self { warn, offline }
    }

    /// Classify a heartbeat age, honoring an explicit transport flag.
    ///
    /// Staleness always wins: an age at or past `offline` is `Bad` even when
    /// the transport still claims the node is online.
    pub fn classify(&self, age: Option<Duration>, reported_online: Option<bool>) -> (bool, Tone) {
        match (age, reported_online) {
            (Some(age), _) if age >= self.offline => (false, Tone::Bad),
            (_, Some(false)) => (false, Tone::Bad),
            (None, Some(true)) => (true, Tone::Ok),
            (None, None) => (false, Tone::Bad),
            (Some(age), _) if age >= self.warn => (true, Tone::Warn),
            (Some(_), _) => (true, Tone::Ok),
        }
    }
}

/// Derived status of one node, recomputed on every tick
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresenceItem {
    pub node_id: String,
    pub online: bool,
    pub tone: Tone,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl PresenceItem {
    /// Build an item from what the transport reported, as of `now`
    pub fn derive(
        node_id: impl Into<String>,
        last_seen: Option<DateTime<Utc>>,
        reported_online: Option<bool>,
        now: DateTime<Utc>,
        thresholds: &PresenceThresholds,
    ) -> Self {
        // A heartbeat from the future counts as just seen
        let age = last_seen.map(|seen| (now - seen).to_std().unwrap_or(Duration::ZERO));
        let (online, tone) = thresholds.classify(age, reported_online);
        Self {
            node_id: node_id.into(),
            online,
            tone,
            age_sec: age.map(|a| a.as_secs()),
            last_seen,
        }
    }
}

/// One entry of a presence snapshot as served by the backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresenceReport {
    pub node_id: String,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    /// Some backends send a precomputed age instead of a timestamp
    #[serde(default)]
    pub age_sec: Option<f64>,
}

impl PresenceReport {
    pub fn to_item(&self, now: DateTime<Utc>, thresholds: &PresenceThresholds) -> PresenceItem {
        let age = match (self.last_seen, self.age_sec) {
            (None, Some(a)) if a.is_finite() && a >= 0.0 => {
                // Ages past what Duration can hold saturate
                Duration::try_from_secs_f64(a).unwrap_or(Duration::MAX)
            }
            _ => {
                return PresenceItem::derive(
                    self.node_id.clone(),
                    self.last_seen,
                    self.online,
                    now,
                    thresholds,
                )
            }
        };

        let last_seen = chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age));
        match last_seen {
            Some(seen) => {
                PresenceItem::derive(self.node_id.clone(), Some(seen), self.online, now, thresholds)
            }
            // Older than any representable timestamp: classify the raw age
            None => {
                let (online, tone) = thresholds.classify(Some(age), self.online);
                PresenceItem {
                    node_id: self.node_id.clone(),
                    online,
                    tone,
                    age_sec: Some(age.as_secs()),
                    last_seen: None,
                }
            }
        }
    }
}
