// Integration tests for the auction sync engine.
//
// These tests exercise the full system end-to-end using the library crate's
// public API: wire frames are parsed by the transport's own frame path, the
// reconciliation loop is driven through its real channels, and the resulting
// whole-state view snapshots are asserted against the scenario.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use auction_sync::app;
use auction_sync::auction::ledger::LedgerKind;
use auction_sync::config::{Config, TimingSection, TransportSection};
use auction_sync::protocol::{
    ClientRequest, PlayerInfo, StateSnapshot, TeamInfo, UserCommand, ViewSnapshot, ViewUpdate,
};
use auction_sync::snapshot::{SnapshotClient, SnapshotError};
use auction_sync::transport::{self, process_message_stream, TransportEvent, TransportHandle};

// ===========================================================================
// Test helpers
// ===========================================================================

fn test_config() -> Config {
    Config {
        api_url: "http://localhost:5000/api".into(),
        socket_url: "ws://localhost:5000/ws".into(),
        room_code: "ABC123".into(),
        username: "alice".into(),
        timing: TimingSection::default(),
        transport: TransportSection::default(),
    }
}

fn player(id: u64, name: &str, base_price: u32) -> PlayerInfo {
    PlayerInfo {
        id,
        name: name.into(),
        role: "BAT".into(),
        country: "India".into(),
        base_price,
        batting_score: Some(8.0),
        bowling_score: None,
        overall_score: Some(7.5),
        is_overseas: false,
    }
}

fn team(team_id: u64, username: &str, purse: u32) -> TeamInfo {
    TeamInfo {
        team_id,
        team_name: format!("Team {username}"),
        logo_url: None,
        username: username.into(),
        initial_purse: 1000,
        purse_left: purse,
        squad_size: 0,
    }
}

fn empty_snapshot(teams: Vec<TeamInfo>) -> StateSnapshot {
    StateSnapshot {
        room_code: Some("ABC123".into()),
        current_player: None,
        current_bid: 0,
        highest_bidder: None,
        timer_remaining: None,
        auction_complete: false,
        teams,
    }
}

/// SnapshotClient serving a canned sequence of results. The last entry is
/// repeated once the queue runs dry.
struct CannedSnapshots {
    responses: Mutex<VecDeque<Result<StateSnapshot, String>>>,
}

impl CannedSnapshots {
    fn new(responses: Vec<Result<StateSnapshot, String>>) -> Arc<Self> {
        Arc::new(CannedSnapshots {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl SnapshotClient for CannedSnapshots {
    async fn fetch_state(&self, room_code: &str) -> Result<StateSnapshot, SnapshotError> {
        let mut responses = self.responses.lock().unwrap();
        let response = if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses.front().cloned().expect("no canned snapshot")
        };
        response.map_err(|_| SnapshotError::Status {
            room_code: room_code.to_string(),
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        })
    }
}

struct Harness {
    transport_tx: mpsc::Sender<TransportEvent>,
    outgoing_rx: mpsc::Receiver<ClientRequest>,
    cmd_tx: mpsc::Sender<UserCommand>,
    ui_rx: mpsc::Receiver<ViewUpdate>,
    task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

fn start_engine(snapshots: Arc<dyn SnapshotClient>) -> Harness {
    let (transport_tx, transport_rx) = mpsc::channel(64);
    let (outgoing_tx, outgoing_rx) = mpsc::channel(64);
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    let handle = TransportHandle::from_parts(outgoing_tx, Arc::new(AtomicBool::new(true)));
    let task = tokio::spawn(app::run(
        test_config(),
        handle,
        transport_rx,
        snapshots,
        cmd_rx,
        ui_tx,
    ));

    Harness {
        transport_tx,
        outgoing_rx,
        cmd_tx,
        ui_rx,
        task,
    }
}

impl Harness {
    /// Connect epoch 1 and wait for the seeding snapshot to land.
    async fn connect_and_seed(&mut self) -> ViewSnapshot {
        self.transport_tx
            .send(TransportEvent::Connected { epoch: 1 })
            .await
            .unwrap();
        next_state(&mut self.ui_rx).await
    }

    /// Run raw wire frames through the transport's frame parser straight
    /// into the engine's intake, preserving delivery order.
    async fn push_frames(&self, frames: Vec<Message>) {
        let items: Vec<Result<Message, tokio_tungstenite::tungstenite::Error>> =
            frames.into_iter().map(Ok).collect();
        process_message_stream(futures_util::stream::iter(items), &self.transport_tx)
            .await
            .unwrap();
    }

    async fn shutdown(self) {
        let _ = self.cmd_tx.send(UserCommand::Leave).await;
        let _ = self.task.await;
    }
}

async fn next_state(ui_rx: &mut mpsc::Receiver<ViewUpdate>) -> ViewSnapshot {
    loop {
        match ui_rx.recv().await.expect("ui channel closed") {
            ViewUpdate::State(snapshot) => return *snapshot,
            _ => continue,
        }
    }
}

/// Serialize a `{"event": ..., "data": ...}` frame the way the server does.
fn frame(event: &str, data: serde_json::Value) -> Message {
    Message::Text(
        serde_json::json!({ "event": event, "data": data })
            .to_string()
            .into(),
    )
}

fn presented_frame(id: u64, name: &str, base: u32, timer: u32) -> Message {
    frame(
        "player_presented",
        serde_json::json!({
            "player": {
                "id": id,
                "name": name,
                "role": "BAT",
                "country": "India",
                "base_price": base,
                "batting_score": 8.0,
                "bowling_score": null,
                "overall_score": 7.5,
                "is_overseas": false
            },
            "current_bid": base,
            "timer_duration": timer
        }),
    )
}

fn bid_frame(player_id: u64, username: &str, amount: u32) -> Message {
    frame(
        "bid_placed",
        serde_json::json!({
            "player_id": player_id,
            "username": username,
            "bid_amount": amount,
            "current_highest": amount,
            "highest_bidder": username
        }),
    )
}

// ===========================================================================
// Full auction flow
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn full_auction_flow_from_wire_frames() {
    let snapshots = CannedSnapshots::new(vec![Ok(empty_snapshot(vec![
        team(1, "alice", 1000),
        team(2, "bob", 1000),
    ]))]);
    let mut harness = start_engine(snapshots);
    let seeded = harness.connect_and_seed().await;
    assert_eq!(seeded.teams.len(), 2);

    // One connection segment, exactly as the server would push it: started,
    // first lot, two bids, sold, purse, second lot, completion.
    harness
        .push_frames(vec![
            frame(
                "auction_started",
                serde_json::json!({"message": "Auction has started!"}),
            ),
            presented_frame(1, "V. Kohli", 200, 30),
            bid_frame(1, "alice", 220),
            bid_frame(1, "bob", 240),
            frame(
                "player_sold",
                serde_json::json!({
                    "player": {"id": 1, "name": "V. Kohli", "role": "BAT"},
                    "sold_to": "bob",
                    "sold_price": 240,
                    "team_id": 2
                }),
            ),
            frame(
                "purse_updated",
                serde_json::json!({
                    "username": "bob",
                    "team_id": 2,
                    "new_purse": 760,
                    "team_name": "Team bob"
                }),
            ),
            presented_frame(2, "J. Bumrah", 150, 30),
            frame(
                "auction_completed",
                serde_json::json!({
                    "message": "All players have been sold!",
                    "room_code": "ABC123"
                }),
            ),
        ])
        .await;

    // Walk the pushes to the terminal state.
    let mut last = next_state(&mut harness.ui_rx).await;
    while !last.auction_complete {
        last = next_state(&mut harness.ui_rx).await;
    }

    // Teams: bob won one lot, alice none.
    let bob = last.teams.iter().find(|t| t.username == "bob").unwrap();
    assert_eq!(bob.squad_size, 1);
    assert_eq!(bob.purse_left, 760);
    let alice = last.teams.iter().find(|t| t.username == "alice").unwrap();
    assert_eq!(alice.squad_size, 0);
    assert_eq!(alice.purse_left, 1000);

    // Ledger: newest first, one entry per accepted event.
    let kinds: Vec<&LedgerKind> = last.activity.iter().map(|e| &e.kind).collect();
    assert!(matches!(kinds[0], LedgerKind::AuctionCompleted { .. }));
    assert!(
        matches!(kinds[1], LedgerKind::PlayerPresented { player_name } if player_name == "J. Bumrah")
    );
    assert!(
        matches!(kinds[2], LedgerKind::PlayerSold { sold_to, price: 240, .. } if sold_to == "bob")
    );
    assert!(matches!(kinds[3], LedgerKind::BidPlaced { amount: 240, .. }));
    assert!(matches!(kinds[4], LedgerKind::BidPlaced { amount: 220, .. }));
    assert!(
        matches!(kinds[5], LedgerKind::PlayerPresented { player_name } if player_name == "V. Kohli")
    );

    // The completion signal reaches the view layer.
    loop {
        match harness.ui_rx.recv().await.unwrap() {
            ViewUpdate::Completed { message } => {
                assert_eq!(message, "All players have been sold!");
                break;
            }
            _ => continue,
        }
    }

    let _ = harness.cmd_tx.send(UserCommand::Leave).await;
    let _ = (&mut harness.task).await;

    // The engine joined the room at connect and left at teardown.
    let mut requests = Vec::new();
    while let Ok(request) = harness.outgoing_rx.try_recv() {
        requests.push(request);
    }
    assert!(requests
        .iter()
        .any(|r| matches!(r, ClientRequest::JoinRoom { room_code, .. } if room_code == "ABC123")));
    assert!(requests
        .iter()
        .any(|r| matches!(r, ClientRequest::LeaveRoom { .. })));
}

// ===========================================================================
// Reconciliation scenarios
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn idle_room_then_first_presentation() {
    let snapshots = CannedSnapshots::new(vec![Ok(empty_snapshot(vec![team(1, "alice", 1000)]))]);
    let mut harness = start_engine(snapshots);

    let state = harness.connect_and_seed().await;
    assert!(state.current_player.is_none());
    assert!(!state.auction_complete);

    // First lot: fresh bid state, fresh clock.
    harness
        .push_frames(vec![presented_frame(1, "P1", 100, 30)])
        .await;

    let state = next_state(&mut harness.ui_rx).await;
    assert_eq!(state.current_player.as_ref().unwrap().name, "P1");
    assert_eq!(state.current_bid, 100);
    assert!(state.highest_bidder.is_none());
    assert_eq!(state.seconds_remaining, 30);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn snapshot_failure_then_retry_recovers() {
    let snapshots = CannedSnapshots::new(vec![
        Err("boom".into()),
        Ok(empty_snapshot(vec![team(1, "alice", 1000)])),
    ]);
    let mut harness = start_engine(snapshots);

    harness
        .transport_tx
        .send(TransportEvent::Connected { epoch: 1 })
        .await
        .unwrap();

    // First fetch fails and surfaces as a retryable error, not a crash.
    loop {
        match harness.ui_rx.recv().await.unwrap() {
            ViewUpdate::SnapshotFailed(_) => break,
            ViewUpdate::State(_) => panic!("failed fetch must not seed state"),
            _ => continue,
        }
    }

    // The view retries; the second fetch seeds the room.
    harness
        .cmd_tx
        .send(UserCommand::RetrySnapshot)
        .await
        .unwrap();
    let state = next_state(&mut harness.ui_rx).await;
    assert_eq!(state.teams.len(), 1);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_mid_auction_rebuilds_from_snapshot() {
    // After the reconnect the server is already a lot ahead; the fresh
    // snapshot replaces everything the client accumulated.
    let mut resumed = empty_snapshot(vec![team(1, "alice", 940), team(2, "bob", 760)]);
    resumed.current_player = Some(player(3, "P3", 90));
    resumed.current_bid = 110;
    resumed.highest_bidder = Some("alice".into());
    resumed.timer_remaining = Some(17);

    let snapshots = CannedSnapshots::new(vec![
        Ok(empty_snapshot(vec![
            team(1, "alice", 1000),
            team(2, "bob", 1000),
        ])),
        Ok(resumed),
    ]);
    let mut harness = start_engine(snapshots);
    harness.connect_and_seed().await;

    harness
        .push_frames(vec![
            presented_frame(1, "P1", 100, 30),
            bid_frame(1, "bob", 150),
        ])
        .await;
    let mut state = next_state(&mut harness.ui_rx).await;
    while state.highest_bidder.is_none() {
        state = next_state(&mut harness.ui_rx).await;
    }
    assert_eq!(state.current_bid, 150);

    // Segment dies; epoch 2 opens. Everything local is suspect.
    harness
        .transport_tx
        .send(TransportEvent::Disconnected)
        .await
        .unwrap();
    harness
        .transport_tx
        .send(TransportEvent::Connected { epoch: 2 })
        .await
        .unwrap();

    let mut state = next_state(&mut harness.ui_rx).await;
    while state.current_player.as_ref().map(|p| p.id) != Some(3) {
        state = next_state(&mut harness.ui_rx).await;
    }
    assert_eq!(state.current_bid, 110);
    assert_eq!(state.highest_bidder.as_deref(), Some("alice"));
    assert_eq!(state.seconds_remaining, 17);
    let bob = state.teams.iter().find(|t| t.username == "bob").unwrap();
    assert_eq!(bob.purse_left, 760);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn late_bids_for_superseded_lots_are_invisible() {
    let snapshots = CannedSnapshots::new(vec![Ok(empty_snapshot(vec![]))]);
    let mut harness = start_engine(snapshots);
    harness.connect_and_seed().await;

    harness
        .push_frames(vec![
            presented_frame(2, "P2", 60, 30),
            // Straggler from lot 1, a redelivered duplicate of lot 2's
            // presentation, then a real bid.
            bid_frame(1, "bob", 500),
            presented_frame(2, "P2", 60, 30),
            bid_frame(2, "carol", 75),
        ])
        .await;

    let mut state = next_state(&mut harness.ui_rx).await;
    while state.highest_bidder.is_none() {
        state = next_state(&mut harness.ui_rx).await;
    }
    assert_eq!(state.current_bid, 75);
    assert_eq!(state.highest_bidder.as_deref(), Some("carol"));

    // Exactly one presentation entry and one bid entry made the ledger.
    let presented_entries = state
        .activity
        .iter()
        .filter(|e| matches!(e.kind, LedgerKind::PlayerPresented { .. }))
        .count();
    let bid_entries = state
        .activity
        .iter()
        .filter(|e| matches!(e.kind, LedgerKind::BidPlaced { .. }))
        .count();
    assert_eq!(presented_entries, 1);
    assert_eq!(bid_entries, 1);

    harness.shutdown().await;
}

// ===========================================================================
// Live transport plumbing
// ===========================================================================

#[tokio::test]
async fn transport_gives_up_after_reconnect_budget() {
    // Nothing listens on this address; the transport should exhaust its
    // attempts quickly and close its event channel.
    let settings = TransportSection {
        reconnect_attempts: 2,
        reconnect_delay_ms: 10,
        reconnect_delay_max_ms: 20,
    };
    let (_handle, mut event_rx, task) =
        transport::spawn("ws://127.0.0.1:1/ws".to_string(), settings);

    assert!(event_rx.recv().await.is_none());
    let _ = task.await;
}
