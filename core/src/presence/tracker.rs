// Heartbeat tracker for streamed presence
//
// Every heartbeat stamps `last_seen`; a periodic tick recomputes ages and
// pushes the derived statuses to subscribers over a broadcast channel.
// Subscribers come and go freely, the tracker keeps running.

use crate::presence::{PresenceItem, PresenceThresholds};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Reserved id for the single whole-connection indicator
pub const CONNECTION_ID: &str = "*";

#[derive(Clone, Debug, Default)]
struct Beat {
    last_seen: Option<DateTime<Utc>>,
    reported: Option<bool>,
}

impl Beat {
    fn stamp(&mut self, online: Option<bool>, at: DateTime<Utc>) {
        // Late-arriving heartbeats never move last_seen backwards
        if self.last_seen.map_or(true, |seen| at > seen) {
            self.last_seen = Some(at);
        }
        if online.is_some() {
            self.reported = online;
        }
    }
}

/// Presence statuses pushed on each tick
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresenceUpdate {
    /// Timestamp (ISO 8601)
    pub timestamp: DateTime<Utc>,
    pub items: Vec<PresenceItem>,
}

/// Fan-out of presence updates to any number of consumers
#[derive(Clone)]
pub struct PresenceBroadcaster {
    sender: broadcast::Sender<PresenceUpdate>,
}

impl PresenceBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn broadcast(&self, update: PresenceUpdate) {
        // Ignore error if no subscribers
        let _ = self.sender.send(update);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceUpdate> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for PresenceBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Tracks last-seen heartbeats per node
pub struct HeartbeatTracker {
    beats: DashMap<String, Beat>,
    thresholds: PresenceThresholds,
}

impl HeartbeatTracker {
    pub fn new(thresholds: PresenceThresholds) -> Self {
        Self {
            beats: DashMap::new(),
            thresholds,
        }
    }

    pub fn thresholds(&self) -> PresenceThresholds {
        self.thresholds
    }

    /// Start tracking a node that has not sent anything yet
    pub fn register(&self, node_id: &str) {
        self.beats.entry(node_id.to_string()).or_default();
    }

    /// Record a heartbeat. An omitted flag keeps the last reported one.
    pub fn record(&self, node_id: &str, online: Option<bool>, at: DateTime<Utc>) {
        self.beats
            .entry(node_id.to_string())
            .or_default()
            .stamp(online, at);
        trace!(target: "presence", node_id = %node_id, ?online, "Heartbeat recorded");
    }

    /// Like `record`, but only for ids already tracked. Returns false for
    /// unknown ids, which are left out of the map.
    pub fn record_known(&self, node_id: &str, online: Option<bool>, at: DateTime<Utc>) -> bool {
        match self.beats.get_mut(node_id) {
            Some(mut beat) => {
                beat.stamp(online, at);
                trace!(target: "presence", node_id = %node_id, ?online, "Heartbeat recorded");
                true
            }
            None => false,
        }
    }

    pub fn record_now(&self, node_id: &str, online: Option<bool>) {
        self.record(node_id, online, Utc::now());
    }

    /// Any message on the shared connection counts as a heartbeat
    pub fn record_connection(&self, at: DateTime<Utc>) {
        self.record(CONNECTION_ID, None, at);
    }

    pub fn connection_status_at(&self, now: DateTime<Utc>) -> PresenceItem {
        self.status_at(CONNECTION_ID, now).unwrap_or_else(|| {
            PresenceItem::derive(CONNECTION_ID, None, None, now, &self.thresholds)
        })
    }

    pub fn status_at(&self, node_id: &str, now: DateTime<Utc>) -> Option<PresenceItem> {
        self.beats.get(node_id).map(|beat| {
            PresenceItem::derive(node_id, beat.last_seen, beat.reported, now, &self.thresholds)
        })
    }

    /// All tracked nodes (the connection indicator excluded), sorted by id
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Vec<PresenceItem> {
        let mut items: Vec<PresenceItem> = self
            .beats
            .iter()
            .filter(|e| e.key() != CONNECTION_ID)
            .map(|e| {
                PresenceItem::derive(
                    e.key().clone(),
                    e.last_seen,
                    e.reported,
                    now,
                    &self.thresholds,
                )
            })
            .collect();
        items.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        items
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    /// Recompute on every tick and push the result to subscribers
    pub fn spawn_ticker(
        self: Arc<Self>,
        period: Duration,
        broadcaster: PresenceBroadcaster,
    ) -> JoinHandle<()> {
        debug!(target: "presence", period_ms = period.as_millis() as u64, "Starting heartbeat ticker");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let now = Utc::now();
                broadcaster.broadcast(PresenceUpdate {
                    timestamp: now,
                    items: self.snapshot_at(now),
                });
            }
        })
    }
}

impl Default for HeartbeatTracker {
    fn default() -> Self {
        Self::new(PresenceThresholds::default())
    }
}
