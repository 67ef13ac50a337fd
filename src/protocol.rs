// Wire protocol types shared by the transport, the snapshot fetcher, and the
// reconciliation loop.
//
// Every WebSocket text frame carries one JSON object of the form
// `{"event": "<name>", "data": {...}}`. Server-pushed frames deserialize into
// [`ServerEvent`]; frames produced by this client serialize from
// [`ClientRequest`]. The view-facing types ([`ViewUpdate`], [`UserCommand`])
// live here too so the engine loop and its consumers share one vocabulary.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Auction entities
// ---------------------------------------------------------------------------

/// The player currently on the block, as presented by the server.
///
/// Immutable once presented; a new presentation always carries a full copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: u64,
    pub name: String,
    pub role: String,
    pub country: String,
    pub base_price: u32,
    pub batting_score: Option<f64>,
    pub bowling_score: Option<f64>,
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub is_overseas: bool,
}

/// Abbreviated player reference carried on `player_sold` frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoldPlayerRef {
    pub id: u64,
    pub name: String,
    pub role: String,
}

/// One team's entry in the snapshot team list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub team_id: u64,
    pub team_name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    pub username: String,
    pub initial_purse: u32,
    pub purse_left: u32,
    #[serde(default)]
    pub squad_size: u32,
}

/// The authoritative full-state snapshot returned by
/// `GET {api_url}/auction/{room_code}/state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub room_code: Option<String>,
    #[serde(default)]
    pub current_player: Option<PlayerInfo>,
    pub current_bid: u32,
    #[serde(default)]
    pub highest_bidder: Option<String>,
    #[serde(default)]
    pub timer_remaining: Option<u32>,
    #[serde(default)]
    pub auction_complete: bool,
    #[serde(default)]
    pub teams: Vec<TeamInfo>,
}

// ---------------------------------------------------------------------------
// Server-pushed events
// ---------------------------------------------------------------------------

/// Payload of `player_presented`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPresentedPayload {
    pub player: PlayerInfo,
    pub current_bid: u32,
    /// Seconds on the bidding clock. The server usually sends 30 (60 for the
    /// opening lot); absent means the client default applies.
    #[serde(default)]
    pub timer_duration: Option<u32>,
}

/// Payload of `bid_placed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidPlacedPayload {
    /// The player the bid is scoped to. Used to discard bids that arrive
    /// late from an already superseded lot.
    pub player_id: u64,
    pub username: String,
    pub bid_amount: u32,
    pub current_highest: u32,
    pub highest_bidder: String,
}

/// Payload of `player_sold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSoldPayload {
    pub player: SoldPlayerRef,
    pub sold_to: String,
    pub sold_price: u32,
    #[serde(default)]
    pub team_id: Option<u64>,
}

/// Payload of `purse_updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurseUpdatedPayload {
    pub username: String,
    #[serde(default)]
    pub team_id: Option<u64>,
    pub new_purse: u32,
    #[serde(default)]
    pub team_name: Option<String>,
}

/// Payload of `auction_completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionCompletedPayload {
    pub message: String,
    #[serde(default)]
    pub room_code: Option<String>,
}

/// Payload of `auction_state`, the snapshot-over-the-push-channel variant.
/// Unlike the HTTP snapshot it does not carry the team list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionStatePayload {
    #[serde(default)]
    pub current_player: Option<PlayerInfo>,
    pub current_bid: u32,
    #[serde(default)]
    pub highest_bidder: Option<String>,
    #[serde(default)]
    pub timer_remaining: Option<u32>,
    #[serde(default)]
    pub auction_complete: bool,
}

/// Payload of `bid_error`: a business-rule rejection of this client's bid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidErrorPayload {
    pub message: String,
}

/// Payload of server notices that only carry a display message
/// (`connected`, `auction_started`, `error`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message: String,
}

/// Payload of `user_joined` / `user_left` room-presence broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomPresencePayload {
    pub username: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub participants_count: u32,
}

/// A server-pushed auction event.
///
/// Delivery is at-least-once and only ordered within one connection segment,
/// so consumers must tolerate duplicates and stale frames; the
/// reconciliation rules in [`crate::auction::view`] own that responsibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    PlayerPresented(PlayerPresentedPayload),
    BidPlaced(BidPlacedPayload),
    PlayerSold(PlayerSoldPayload),
    PurseUpdated(PurseUpdatedPayload),
    AuctionCompleted(AuctionCompletedPayload),
    AuctionState(AuctionStatePayload),
    BidError(BidErrorPayload),
    AuctionStarted(MessagePayload),
    Connected(MessagePayload),
    Error(MessagePayload),
    UserJoined(RoomPresencePayload),
    UserLeft(RoomPresencePayload),
    /// Any event name this client does not recognize. Ignored.
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Client-produced requests
// ---------------------------------------------------------------------------

/// A request frame sent from this client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientRequest {
    JoinRoom { room_code: String, username: String },
    LeaveRoom { room_code: String, username: String },
    GetAuctionState { room_code: String },
    PlaceBid { room_code: String, username: String },
    TimerExpired { room_code: String },
}

// ---------------------------------------------------------------------------
// View boundary
// ---------------------------------------------------------------------------

/// Transport connectivity as seen by the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Commands issued by the surrounding view into the engine loop.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    /// Submit a bid intent for the current lot. No optimistic mutation: the
    /// view waits for `bid_placed` or `bid_error`.
    PlaceBid,
    /// Ask the server for a fresh snapshot after a failed initial fetch.
    RetrySnapshot,
    /// Leave the auction view; tears the engine down.
    Leave,
}

/// Updates pushed from the engine loop to the view.
///
/// The view subscribes to whole-state changes: after every accepted mutation
/// the engine emits a complete [`ViewSnapshot`] rather than field-level
/// deltas, keeping invariant enforcement inside the reconciliation step.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    State(Box<ViewSnapshot>),
    ConnectionStatus(ConnectionStatus),
    /// The initial snapshot fetch failed; the view should offer a retry.
    SnapshotFailed(String),
    /// Informational room notice (auction started, participant joined or
    /// left). Never carries auction state.
    Notice(String),
    /// Terminal: the auction finished. The view navigates away after its
    /// own grace delay.
    Completed { message: String },
}

/// A complete, self-consistent rendering of the reconciled auction state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewSnapshot {
    pub current_player: Option<PlayerInfo>,
    pub current_bid: u32,
    pub highest_bidder: Option<String>,
    pub seconds_remaining: u32,
    pub teams: Vec<crate::auction::view::TeamState>,
    pub activity: Vec<crate::auction::ledger::LedgerEntry>,
    pub auction_complete: bool,
    /// Transient server-side bid rejection, auto-cleared by the engine.
    pub bid_error: Option<String>,
}
