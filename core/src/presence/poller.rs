// Fetch-based presence polling
//
// Polls a `PresenceSource` on a fixed interval and writes classified snapshots
// into a `PresenceBoard`. Failed polls are logged and retried by the next tick.

use crate::presence::board::{MergeMode, PresenceBoard};
use crate::presence::{PresenceReport, PresenceThresholds};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Anything that can produce a presence snapshot
#[async_trait]
pub trait PresenceSource: Send + Sync {
    async fn fetch_presence(&self) -> Result<Vec<PresenceReport>>;
}

pub struct PresencePoller {
    source: Arc<dyn PresenceSource>,
    board: Arc<PresenceBoard>,
    interval: Duration,
    mode: MergeMode,
    thresholds: PresenceThresholds,
}

impl PresencePoller {
    pub fn new(source: Arc<dyn PresenceSource>, board: Arc<PresenceBoard>) -> Self {
        Self {
            source,
            board,
            interval: DEFAULT_POLL_INTERVAL,
            mode: MergeMode::Replace,
            thresholds: PresenceThresholds::default(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_thresholds(mut self, thresholds: PresenceThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn board(&self) -> Arc<PresenceBoard> {
        Arc::clone(&self.board)
    }

    /// Fetch once and apply. Returns whether the snapshot landed on the board.
    pub async fn poll_once(&self) -> Result<bool> {
        self.poll(&AtomicBool::new(false)).await
    }

    async fn poll(&self, cancelled: &AtomicBool) -> Result<bool> {
        let seq = self.board.next_seq();
        let reports = self.source.fetch_presence().await?;
        if cancelled.load(Ordering::SeqCst) {
            debug!(target: "presence", seq, "Poller cancelled, dropping response");
            return Ok(false);
        }
        let now = Utc::now();
        let items = reports
            .iter()
            .map(|r| r.to_item(now, &self.thresholds))
            .collect();
        Ok(self.board.apply(seq, items, self.mode).await)
    }

    /// Spawn the polling loop. The first poll happens immediately.
    pub fn start(self) -> PollerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        info!(
            target: "presence",
            interval_ms = self.interval.as_millis() as u64,
            mode = ?self.mode,
            "Starting presence poller"
        );

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = self.poll(&flag).await {
                    warn!(target: "presence", error = %e, "Presence poll failed");
                }
            }
        });

        PollerHandle {
            cancelled,
            task: Some(task),
        }
    }
}

/// Owner of a running poller; stopping or dropping it ends the loop
pub struct PollerHandle {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn stop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
