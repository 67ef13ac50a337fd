// The reconciliation event loop.
//
// One task owns all mutable auction state and reacts to four serialized
// intakes: transport events, countdown ticks, user commands, and snapshot
// fetch completions. Snapshots seed and re-anchor the view; push events
// mutate it through the acceptance rules in [`crate::auction::view`]; the
// activity ledger and team purses are projections of the accepted stream.
// After every accepted mutation the loop pushes a whole-state
// [`ViewSnapshot`] to the view layer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::auction::ledger::{ActivityLedger, LedgerKind};
use crate::auction::view::{
    AuctionView, BidOutcome, Phase, PresentOutcome, SoldOutcome,
};
use crate::config::Config;
use crate::countdown::Countdown;
use crate::protocol::{
    ClientRequest, ConnectionStatus, ServerEvent, UserCommand, ViewSnapshot, ViewUpdate,
};
use crate::snapshot::{SnapshotClient, SnapshotError};
use crate::transport::{TransportEvent, TransportHandle};

// ---------------------------------------------------------------------------
// Engine state
// ---------------------------------------------------------------------------

/// Completion of a snapshot fetch task.
struct FetchOutcome {
    /// Which issued fetch this is; only the latest one is honored.
    seq: u64,
    /// Presentation counter at issue time. If presentations moved on while
    /// the fetch was in flight, its snapshot describes a superseded lot and
    /// is discarded.
    anchor: u64,
    result: Result<crate::protocol::StateSnapshot, SnapshotError>,
}

/// All mutable state owned by the event loop.
pub struct Engine {
    config: Config,
    pub view: AuctionView,
    pub ledger: ActivityLedger,
    countdown: Countdown,
    connection_status: ConnectionStatus,
    /// Connection epoch of the segment currently feeding events.
    epoch: u64,
    /// Bumped on every accepted presentation. A snapshot fetch carries the
    /// value at issue time; a mismatch at resolve time means a newer lot
    /// arrived mid-flight and the snapshot describes a superseded one.
    anchor: u64,
    /// Sequence number of the most recently issued snapshot fetch.
    fetch_seq: u64,
    /// Transient server-side bid rejection and when to auto-clear it.
    bid_error: Option<String>,
    bid_error_expires: Option<Instant>,
    /// Last countdown reading pushed to the view, to avoid a state push per
    /// tick when nothing visible changed.
    last_pushed_seconds: u32,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Engine {
            config,
            view: AuctionView::new(),
            ledger: ActivityLedger::new(),
            countdown: Countdown::new(),
            connection_status: ConnectionStatus::Disconnected,
            epoch: 0,
            anchor: 0,
            fetch_seq: 0,
            bid_error: None,
            bid_error_expires: None,
            last_pushed_seconds: 0,
        }
    }

    /// Assemble the whole-state snapshot pushed to the view layer.
    fn build_view_snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            current_player: self.view.current_player.clone(),
            current_bid: self.view.current_bid,
            highest_bidder: self.view.highest_bidder.clone(),
            seconds_remaining: self.countdown.seconds_remaining(),
            teams: self.view.teams.clone(),
            activity: self.ledger.entries().to_vec(),
            auction_complete: self.view.phase == Phase::Completed,
            bid_error: self.bid_error.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the reconciliation loop until the view leaves or the transport gives
/// up for good.
///
/// The snapshot fetch is the only suspending operation, and it runs as a
/// spawned task reporting back through a channel, so transport events that
/// arrive mid-fetch are still applied in delivery order.
pub async fn run(
    config: Config,
    transport: TransportHandle,
    mut transport_rx: mpsc::Receiver<TransportEvent>,
    snapshot_client: Arc<dyn SnapshotClient>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<ViewUpdate>,
) -> anyhow::Result<()> {
    info!(room = %config.room_code, "auction sync engine started");

    let mut engine = Engine::new(config);
    let (fetch_tx, mut fetch_rx) = mpsc::channel::<FetchOutcome>(8);

    let mut tick = tokio::time::interval(Duration::from_millis(
        engine.config.timing.tick_interval_ms,
    ));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // --- Transport events ---
            event = transport_rx.recv() => {
                match event {
                    Some(TransportEvent::Connected { epoch }) => {
                        handle_connected(&mut engine, epoch, &transport, &snapshot_client, &fetch_tx, &ui_tx).await;
                    }
                    Some(TransportEvent::Disconnected) => {
                        info!("transport disconnected");
                        engine.connection_status = ConnectionStatus::Disconnected;
                        let _ = ui_tx
                            .send(ViewUpdate::ConnectionStatus(ConnectionStatus::Disconnected))
                            .await;
                    }
                    Some(TransportEvent::Event(event)) => {
                        handle_server_event(&mut engine, event, &ui_tx).await;
                    }
                    None => {
                        // Reconnection budget exhausted; nothing more can
                        // arrive, so the engine stops.
                        warn!("transport channel closed, engine shutting down");
                        let _ = ui_tx
                            .send(ViewUpdate::ConnectionStatus(ConnectionStatus::Disconnected))
                            .await;
                        break;
                    }
                }
            }

            // --- Snapshot fetch completions ---
            outcome = fetch_rx.recv() => {
                if let Some(outcome) = outcome {
                    handle_fetch_outcome(&mut engine, outcome, &ui_tx).await;
                }
            }

            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::PlaceBid) => {
                        if engine.view.phase == Phase::Active
                            && engine.connection_status == ConnectionStatus::Connected
                        {
                            transport.send(ClientRequest::PlaceBid {
                                room_code: engine.config.room_code.clone(),
                                username: engine.config.username.clone(),
                            });
                        } else {
                            debug!(
                                phase = ?engine.view.phase,
                                status = ?engine.connection_status,
                                "bid command ignored"
                            );
                        }
                    }
                    Some(UserCommand::RetrySnapshot) => {
                        issue_fetch(&mut engine, &snapshot_client, &fetch_tx);
                    }
                    Some(UserCommand::Leave) | None => {
                        info!("leaving auction view");
                        break;
                    }
                }
            }

            // --- Countdown / housekeeping tick ---
            _ = tick.tick() => {
                handle_tick(&mut engine, &transport, &ui_tx).await;
            }
        }
    }

    // Teardown: tell the server, stop the clock, drop subscriptions.
    transport.send(ClientRequest::LeaveRoom {
        room_code: engine.config.room_code.clone(),
        username: engine.config.username.clone(),
    });
    engine.countdown.clear();
    info!("auction sync engine exiting");
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// A connection segment opened. Room membership is not remembered across
/// reconnects, so the room is re-joined every time; and because in-flight
/// messages may have been silently dropped, local truth is re-derived from a
/// fresh snapshot rather than trusted.
async fn handle_connected(
    engine: &mut Engine,
    epoch: u64,
    transport: &TransportHandle,
    snapshot_client: &Arc<dyn SnapshotClient>,
    fetch_tx: &mpsc::Sender<FetchOutcome>,
    ui_tx: &mpsc::Sender<ViewUpdate>,
) {
    let reconnect = engine.epoch != 0;
    engine.epoch = epoch;
    engine.connection_status = ConnectionStatus::Connected;
    if reconnect {
        info!(epoch, "transport reconnected, re-deriving state from snapshot");
    } else {
        info!(epoch, "transport connected");
    }
    let _ = ui_tx
        .send(ViewUpdate::ConnectionStatus(ConnectionStatus::Connected))
        .await;

    transport.send(ClientRequest::JoinRoom {
        room_code: engine.config.room_code.clone(),
        username: engine.config.username.clone(),
    });
    // Also request the push-channel restatement; the reply arrives as an
    // `auction_state` event and can seed the view while the HTTP fetch is
    // still in flight.
    transport.send(ClientRequest::GetAuctionState {
        room_code: engine.config.room_code.clone(),
    });
    issue_fetch(engine, snapshot_client, fetch_tx);
}

/// Spawn a snapshot fetch tagged with the current anchor so a late result
/// cannot overwrite state that moved forward while it was in flight.
fn issue_fetch(
    engine: &mut Engine,
    snapshot_client: &Arc<dyn SnapshotClient>,
    fetch_tx: &mpsc::Sender<FetchOutcome>,
) {
    engine.fetch_seq += 1;
    let seq = engine.fetch_seq;
    let anchor = engine.anchor;
    let room_code = engine.config.room_code.clone();
    let client = Arc::clone(snapshot_client);
    let tx = fetch_tx.clone();

    debug!(seq, "issuing snapshot fetch");
    tokio::spawn(async move {
        let result = client.fetch_state(&room_code).await;
        let _ = tx.send(FetchOutcome { seq, anchor, result }).await;
    });
}

async fn handle_fetch_outcome(
    engine: &mut Engine,
    outcome: FetchOutcome,
    ui_tx: &mpsc::Sender<ViewUpdate>,
) {
    if outcome.seq != engine.fetch_seq {
        debug!(seq = outcome.seq, "superseded snapshot fetch, discarding");
        return;
    }
    match outcome.result {
        Ok(snapshot) => {
            if outcome.anchor != engine.anchor {
                debug!(
                    "snapshot resolved after a newer presentation, discarding"
                );
                return;
            }
            let timer = engine
                .view
                .apply_snapshot(&snapshot, engine.config.timing.default_timer_seconds);
            match timer {
                Some(seconds) => engine.countdown.set(seconds),
                None => engine.countdown.clear(),
            }
            info!(
                teams = engine.view.teams.len(),
                phase = ?engine.view.phase,
                "snapshot applied"
            );
            push_state(engine, ui_tx).await;
        }
        Err(e) => {
            warn!("snapshot fetch failed: {e}");
            let _ = ui_tx.send(ViewUpdate::SnapshotFailed(e.to_string())).await;
        }
    }
}

async fn handle_server_event(
    engine: &mut Engine,
    event: ServerEvent,
    ui_tx: &mpsc::Sender<ViewUpdate>,
) {
    match event {
        ServerEvent::PlayerPresented(payload) => {
            let outcome = engine
                .view
                .apply_presented(&payload, engine.config.timing.default_timer_seconds);
            if let PresentOutcome::Accepted { timer_seconds } = outcome {
                engine.anchor += 1;
                engine.countdown.set(timer_seconds);
                engine.bid_error = None;
                engine.bid_error_expires = None;
                engine.ledger.record(LedgerKind::PlayerPresented {
                    player_name: payload.player.name.clone(),
                });
                push_state(engine, ui_tx).await;
            }
        }
        ServerEvent::BidPlaced(payload) => {
            if engine.view.apply_bid(&payload) == BidOutcome::Accepted {
                engine.bid_error = None;
                engine.bid_error_expires = None;
                engine.ledger.record(LedgerKind::BidPlaced {
                    username: payload.username.clone(),
                    amount: payload.bid_amount,
                });
                push_state(engine, ui_tx).await;
            }
        }
        ServerEvent::PlayerSold(payload) => {
            if let SoldOutcome::Accepted { .. } = engine.view.apply_sold(&payload) {
                engine.countdown.clear();
                engine.ledger.record(LedgerKind::PlayerSold {
                    player_name: payload.player.name.clone(),
                    sold_to: payload.sold_to.clone(),
                    price: payload.sold_price,
                });
                push_state(engine, ui_tx).await;
            }
        }
        ServerEvent::PurseUpdated(payload) => {
            if engine.view.apply_purse(&payload) {
                push_state(engine, ui_tx).await;
            }
        }
        ServerEvent::AuctionCompleted(payload) => {
            if engine.view.apply_completed() {
                engine.countdown.clear();
                engine.ledger.record(LedgerKind::AuctionCompleted {
                    message: payload.message.clone(),
                });
                push_state(engine, ui_tx).await;
                let _ = ui_tx
                    .send(ViewUpdate::Completed {
                        message: payload.message,
                    })
                    .await;
            }
        }
        ServerEvent::AuctionState(payload) => {
            // Snapshot-over-the-push-channel: re-anchors lot state the same
            // way an HTTP snapshot does, minus the team list it lacks.
            let timer = engine
                .view
                .apply_push_state(&payload, engine.config.timing.default_timer_seconds);
            match timer {
                Some(seconds) => engine.countdown.set(seconds),
                None => engine.countdown.clear(),
            }
            push_state(engine, ui_tx).await;
        }
        ServerEvent::BidError(payload) => {
            debug!(message = %payload.message, "bid rejected by server");
            engine.bid_error = Some(payload.message);
            engine.bid_error_expires = Some(
                Instant::now() + Duration::from_secs(engine.config.timing.bid_error_seconds),
            );
            push_state(engine, ui_tx).await;
        }
        ServerEvent::AuctionStarted(payload) => {
            let _ = ui_tx.send(ViewUpdate::Notice(payload.message)).await;
        }
        ServerEvent::UserJoined(payload) => {
            let _ = ui_tx
                .send(ViewUpdate::Notice(format!("{} joined the room", payload.username)))
                .await;
        }
        ServerEvent::UserLeft(payload) => {
            let _ = ui_tx
                .send(ViewUpdate::Notice(format!("{} left the room", payload.username)))
                .await;
        }
        ServerEvent::Connected(payload) => {
            debug!(message = %payload.message, "server greeting");
        }
        ServerEvent::Error(payload) => {
            warn!(message = %payload.message, "server error notice");
        }
        ServerEvent::Unknown => {}
    }
}

/// Housekeeping on every tick: expiry signal, bid-error auto-clear, and a
/// state push whenever the displayed seconds changed.
async fn handle_tick(
    engine: &mut Engine,
    transport: &TransportHandle,
    ui_tx: &mpsc::Sender<ViewUpdate>,
) {
    if engine.countdown.poll_expired() {
        info!("bidding clock reached zero, notifying server");
        transport.send(ClientRequest::TimerExpired {
            room_code: engine.config.room_code.clone(),
        });
    }

    if let Some(expires) = engine.bid_error_expires {
        if Instant::now() >= expires {
            engine.bid_error = None;
            engine.bid_error_expires = None;
            push_state(engine, ui_tx).await;
        }
    }

    if engine.countdown.is_armed() {
        let seconds = engine.countdown.seconds_remaining();
        if seconds != engine.last_pushed_seconds {
            push_state(engine, ui_tx).await;
        }
    }
}

async fn push_state(engine: &mut Engine, ui_tx: &mpsc::Sender<ViewUpdate>) {
    let snapshot = engine.build_view_snapshot();
    engine.last_pushed_seconds = snapshot.seconds_remaining;
    let _ = ui_tx.send(ViewUpdate::State(Box::new(snapshot))).await;
}
