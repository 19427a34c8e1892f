use aquanet_core::presence::{
    HeartbeatTracker, MergeMode, PresenceBoard, PresenceBroadcaster, PresenceItem,
    PresencePoller, PresenceReport, PresenceSource, PresenceThresholds, Tone, CONNECTION_ID,
};
use aquanet_core::{AquanetError, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

mock! {
    pub Source {}

    #[async_trait]
    impl PresenceSource for Source {
        async fn fetch_presence(&self) -> Result<Vec<PresenceReport>>;
    }
}

fn report(id: &str, age_sec: f64) -> PresenceReport {
    PresenceReport {
        node_id: id.to_string(),
        online: None,
        last_seen: None,
        age_sec: Some(age_sec),
    }
}

fn item(id: &str, tone: Tone) -> PresenceItem {
    PresenceItem {
        node_id: id.to_string(),
        online: tone != Tone::Bad,
        tone,
        age_sec: None,
        last_seen: None,
    }
}

fn secs(n: u64) -> Option<Duration> {
    Some(Duration::from_secs(n))
}

// =============================================================================
// Classification
// =============================================================================

#[test]
fn thresholds_are_inclusive_lower_bounds() {
    let t = PresenceThresholds::default();
    assert_eq!(t.classify(secs(0), None), (true, Tone::Ok));
    assert_eq!(t.classify(secs(29), None), (true, Tone::Ok));
    assert_eq!(t.classify(secs(30), None), (true, Tone::Warn));
    assert_eq!(t.classify(secs(89), None), (true, Tone::Warn));
    assert_eq!(t.classify(secs(90), None), (false, Tone::Bad));
}

#[test]
fn typical_ages() {
    let t = PresenceThresholds::default();
    assert_eq!(t.classify(secs(10), None).1, Tone::Ok);
    assert_eq!(t.classify(secs(45), None).1, Tone::Warn);
    assert_eq!(t.classify(secs(120), None), (false, Tone::Bad));
}

#[test]
fn staleness_overrides_reported_online() {
    let t = PresenceThresholds::default();
    assert_eq!(t.classify(secs(95), Some(true)), (false, Tone::Bad));
    assert_eq!(t.classify(secs(5), Some(false)), (false, Tone::Bad));
    assert_eq!(t.classify(secs(5), Some(true)), (true, Tone::Ok));
}

#[test]
fn unknown_age_depends_on_flag() {
    let t = PresenceThresholds::default();
    assert_eq!(t.classify(None, Some(true)), (true, Tone::Ok));
    assert_eq!(t.classify(None, None), (false, Tone::Bad));
    assert_eq!(t.classify(None, Some(false)), (false, Tone::Bad));
}

#[test]
fn custom_thresholds() {
    let t = PresenceThresholds::new(Duration::from_secs(5), Duration::from_secs(10));
    assert_eq!(t.classify(secs(4), None).1, Tone::Ok);
    assert_eq!(t.classify(secs(5), None).1, Tone::Warn);
    assert_eq!(t.classify(secs(10), None).1, Tone::Bad);
}

#[test]
fn derive_clamps_future_heartbeats() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let future = now + chrono::Duration::seconds(20);
    let item = PresenceItem::derive("T1", Some(future), None, now, &PresenceThresholds::default());
    assert_eq!(item.age_sec, Some(0));
    assert_eq!(item.tone, Tone::Ok);
}

#[test]
fn report_age_is_used_without_timestamp() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let t = PresenceThresholds::default();

    let item = report("P1", 45.0).to_item(now, &t);
    assert_eq!(item.age_sec, Some(45));
    assert_eq!(item.tone, Tone::Warn);
    assert_eq!(item.last_seen, Some(now - chrono::Duration::seconds(45)));

    let explicit = PresenceReport {
        node_id: "P2".into(),
        online: Some(true),
        last_seen: Some(now - chrono::Duration::seconds(3)),
        age_sec: Some(500.0),
    };
    // Timestamp wins over the precomputed age
    assert_eq!(explicit.to_item(now, &t).tone, Tone::Ok);
}

#[test]
fn ages_beyond_timestamp_range_are_bad() {
    let now = Utc::now();
    let t = PresenceThresholds::default();
    for raw in [
        r#"{"node_id":"T1","age_sec":1e13}"#,
        r#"{"node_id":"T1","age_sec":1e30}"#,
        r#"{"node_id":"T1","online":true,"age_sec":1e30}"#,
    ] {
        let report: PresenceReport = serde_json::from_str(raw).unwrap();
        let item = report.to_item(now, &t);
        assert_eq!(item.tone, Tone::Bad, "{}", raw);
        assert!(!item.online, "{}", raw);
        assert!(item.last_seen.is_none(), "{}", raw);
        assert!(item.age_sec.unwrap() >= 10_000_000_000_000, "{}", raw);
    }
}

#[test]
fn negative_or_nan_age_counts_as_unknown() {
    let now = Utc::now();
    let t = PresenceThresholds::default();
    assert_eq!(report("T1", -5.0).to_item(now, &t).age_sec, None);
    assert_eq!(report("T1", f64::NAN).to_item(now, &t).tone, Tone::Bad);
}

#[test]
fn tone_serializes_lowercase() {
    let json = serde_json::to_value(item("V1", Tone::Warn)).unwrap();
    assert_eq!(json["tone"], "warn");
    assert!(json.get("age_sec").is_none());
}

// =============================================================================
// Heartbeat tracker
// =============================================================================

#[test]
fn tracker_ages_heartbeats() {
    let tracker = HeartbeatTracker::default();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    tracker.record("T1", None, t0);

    let at = |s: i64| t0 + chrono::Duration::seconds(s);
    assert_eq!(tracker.status_at("T1", at(10)).unwrap().tone, Tone::Ok);
    assert_eq!(tracker.status_at("T1", at(45)).unwrap().tone, Tone::Warn);
    let gone = tracker.status_at("T1", at(120)).unwrap();
    assert_eq!(gone.tone, Tone::Bad);
    assert!(!gone.online);
    assert!(tracker.status_at("P1", at(10)).is_none());
}

#[test]
fn late_heartbeats_do_not_rewind() {
    let tracker = HeartbeatTracker::default();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    tracker.record("T1", Some(true), t0);
    tracker.record("T1", None, t0 - chrono::Duration::seconds(60));

    let status = tracker.status_at("T1", t0).unwrap();
    assert_eq!(status.last_seen, Some(t0));
    // Omitted flag keeps the previous one
    assert!(status.online);

    tracker.record("T1", Some(false), t0);
    assert_eq!(tracker.status_at("T1", t0).unwrap().tone, Tone::Bad);
}

#[test]
fn record_known_ignores_unregistered_ids() {
    let tracker = HeartbeatTracker::default();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    tracker.register("T1");

    assert!(tracker.record_known("T1", Some(true), t0));
    assert!(!tracker.record_known("random-1", Some(true), t0));
    assert_eq!(tracker.len(), 1);
    assert!(tracker.status_at("random-1", t0).is_none());
    assert_eq!(tracker.status_at("T1", t0).unwrap().tone, Tone::Ok);
}

#[test]
fn registered_nodes_start_bad() {
    let tracker = HeartbeatTracker::default();
    tracker.register("V1");
    tracker.register("A1");
    let now = Utc::now();
    let snapshot = tracker.snapshot_at(now);
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].node_id, "A1");
    assert!(snapshot.iter().all(|i| i.tone == Tone::Bad && i.age_sec.is_none()));
}

#[test]
fn connection_indicator_is_tracked_separately() {
    let tracker = HeartbeatTracker::default();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    assert_eq!(tracker.connection_status_at(t0).tone, Tone::Bad);

    tracker.record_connection(t0);
    tracker.record("T1", None, t0);
    let status = tracker.connection_status_at(t0 + chrono::Duration::seconds(31));
    assert_eq!(status.node_id, CONNECTION_ID);
    assert_eq!(status.tone, Tone::Warn);

    let snapshot = tracker.snapshot_at(t0);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].node_id, "T1");
}

#[tokio::test]
async fn ticker_broadcasts_snapshots() {
    let tracker = Arc::new(HeartbeatTracker::default());
    tracker.record_now("T1", Some(true));
    let broadcaster = PresenceBroadcaster::new(8);
    let mut rx = broadcaster.subscribe();
    assert_eq!(broadcaster.subscriber_count(), 1);

    let task = Arc::clone(&tracker).spawn_ticker(Duration::from_millis(10), broadcaster.clone());
    let update = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("tick within timeout")
        .expect("channel open");
    assert_eq!(update.items.len(), 1);
    assert_eq!(update.items[0].tone, Tone::Ok);
    task.abort();
}

// =============================================================================
// Presence board
// =============================================================================

#[tokio::test]
async fn replace_drops_absent_ids() {
    let board = PresenceBoard::new();
    assert!(board.apply(1, vec![item("A", Tone::Ok), item("B", Tone::Warn)], MergeMode::Replace).await);
    assert!(board.apply(2, vec![item("B", Tone::Bad)], MergeMode::Replace).await);

    let all = board.all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].tone, Tone::Bad);
    assert_eq!(board.version(), 2);
}

#[tokio::test]
async fn merge_keeps_absent_ids() {
    let board = PresenceBoard::new();
    board.apply(1, vec![item("A", Tone::Ok), item("B", Tone::Warn)], MergeMode::Merge).await;
    board.apply(2, vec![item("B", Tone::Ok)], MergeMode::Merge).await;

    assert_eq!(board.len().await, 2);
    assert_eq!(board.get("A").await.unwrap().tone, Tone::Ok);
    assert_eq!(board.get("B").await.unwrap().tone, Tone::Ok);
}

#[tokio::test]
async fn out_of_order_responses_are_discarded() {
    let board = PresenceBoard::new();
    let first = board.next_seq();
    let second = board.next_seq();
    assert!(second > first);

    assert!(board.apply(second, vec![item("A", Tone::Ok)], MergeMode::Replace).await);
    assert!(!board.apply(first, vec![item("A", Tone::Bad)], MergeMode::Replace).await);
    assert_eq!(board.get("A").await.unwrap().tone, Tone::Ok);
    assert_eq!(board.version(), 1);
}

#[tokio::test]
async fn subscribers_see_version_bumps() {
    let board = PresenceBoard::new();
    let mut rx = board.subscribe();
    board.apply(1, vec![], MergeMode::Replace).await;
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow(), 1);
}

// =============================================================================
// Poller
// =============================================================================

#[tokio::test]
async fn poll_once_classifies_and_applies() {
    let mut source = MockSource::new();
    source
        .expect_fetch_presence()
        .times(1)
        .returning(|| Ok(vec![report("T1", 10.0), report("P1", 45.0), report("V1", 120.0)]));

    let board = Arc::new(PresenceBoard::new());
    let poller = PresencePoller::new(Arc::new(source), Arc::clone(&board));
    assert!(poller.poll_once().await.unwrap());

    let tones: Vec<(String, Tone)> = board
        .all()
        .await
        .into_iter()
        .map(|i| (i.node_id, i.tone))
        .collect();
    assert_eq!(
        tones,
        vec![
            ("P1".to_string(), Tone::Warn),
            ("T1".to_string(), Tone::Ok),
            ("V1".to_string(), Tone::Bad),
        ]
    );
    assert_eq!(board.version(), 1);
}

#[tokio::test]
async fn failed_poll_leaves_board_untouched() {
    let mut source = MockSource::new();
    source
        .expect_fetch_presence()
        .returning(|| Err(AquanetError::Transport("connection refused".into())));

    let board = Arc::new(PresenceBoard::new());
    board.apply(board.next_seq(), vec![item("T1", Tone::Ok)], MergeMode::Replace).await;

    let poller = PresencePoller::new(Arc::new(source), Arc::clone(&board));
    assert!(poller.poll_once().await.is_err());
    assert_eq!(board.get("T1").await.unwrap().tone, Tone::Ok);
    assert_eq!(board.version(), 1);
}

#[tokio::test]
async fn started_poller_updates_board_until_stopped() {
    let mut source = MockSource::new();
    source
        .expect_fetch_presence()
        .returning(|| Ok(vec![report("T1", 1.0)]));

    let board = Arc::new(PresenceBoard::new());
    let mut versions = board.subscribe();
    let mut handle = PresencePoller::new(Arc::new(source), Arc::clone(&board))
        .with_interval(Duration::from_millis(20))
        .with_mode(MergeMode::Merge)
        .start();

    tokio::time::timeout(Duration::from_secs(2), versions.changed())
        .await
        .expect("first poll lands")
        .unwrap();
    assert_eq!(board.get("T1").await.unwrap().tone, Tone::Ok);

    handle.stop();
    assert!(handle.is_stopped());
    let stopped_at = board.version();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(board.version(), stopped_at);
}

#[tokio::test]
async fn oversized_ages_do_not_stop_polling() {
    let mut source = MockSource::new();
    source.expect_fetch_presence().returning(|| {
        Ok(vec![
            report("T1", 1e30),
            report("P1", 1e13),
            report("V1", 2.0),
        ])
    });

    let board = Arc::new(PresenceBoard::new());
    let mut versions = board.subscribe();
    let handle = PresencePoller::new(Arc::new(source), Arc::clone(&board))
        .with_interval(Duration::from_millis(10))
        .start();

    // Several snapshots land, so the loop outlived the first one
    for _ in 0..3 {
        tokio::time::timeout(Duration::from_secs(2), versions.changed())
            .await
            .expect("poll keeps running")
            .unwrap();
    }
    assert_eq!(board.get("T1").await.unwrap().tone, Tone::Bad);
    assert_eq!(board.get("P1").await.unwrap().tone, Tone::Bad);
    assert_eq!(board.get("V1").await.unwrap().tone, Tone::Ok);
    drop(handle);
}

/// Source that blocks until released, to race cancellation against a fetch
struct GatedSource {
    gate: Arc<Notify>,
}

#[async_trait]
impl PresenceSource for GatedSource {
    async fn fetch_presence(&self) -> Result<Vec<PresenceReport>> {
        self.gate.notified().await;
        Ok(vec![report("T1", 1.0)])
    }
}

#[tokio::test]
async fn dropping_handle_cancels_in_flight_poll() {
    let gate = Arc::new(Notify::new());
    let board = Arc::new(PresenceBoard::new());
    let handle = PresencePoller::new(
        Arc::new(GatedSource {
            gate: Arc::clone(&gate),
        }),
        Arc::clone(&board),
    )
    .with_interval(Duration::from_millis(10))
    .start();

    tokio::time::sleep(Duration::from_millis(30)).await;
    drop(handle);
    gate.notify_waiters();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(board.version(), 0);
    assert_eq!(board.len().await, 0);
}
