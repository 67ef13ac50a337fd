// The reconciled auction view: current lot, bid state, team purses.
//
// This is the single authoritative local state. Snapshots replace it
// wholesale; push events mutate it only through the acceptance rules below.
// The transport offers no lot-scoped sequence numbers, so idempotence and
// ordering hang on one rule: a delta is applied only when it references the
// lot this view currently believes is on the block.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::protocol::{
    AuctionStatePayload, BidPlacedPayload, PlayerInfo, PlayerPresentedPayload, PlayerSoldPayload,
    PurseUpdatedPayload, StateSnapshot, TeamInfo,
};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where the auction stands, as known locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the first snapshot, or snapshot said nothing is on the block.
    Idle,
    /// A lot is live and open for bidding.
    Active,
    /// The lot sold; waiting for the next presentation or completion.
    Settling,
    /// Terminal. No further lot or bid changes are accepted.
    Completed,
}

// ---------------------------------------------------------------------------
// Team state
// ---------------------------------------------------------------------------

/// One team's running purse and squad tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamState {
    pub team_id: u64,
    /// Participant identity; the correlation key for sold/purse events.
    pub username: String,
    pub team_name: String,
    pub logo_url: Option<String>,
    pub purse_left: u32,
    pub squad_size: u32,
}

impl From<&TeamInfo> for TeamState {
    fn from(info: &TeamInfo) -> Self {
        TeamState {
            team_id: info.team_id,
            username: info.username.clone(),
            team_name: info.team_name.clone(),
            logo_url: info.logo_url.clone(),
            purse_left: info.purse_left,
            squad_size: info.squad_size,
        }
    }
}

// ---------------------------------------------------------------------------
// Acceptance outcomes
// ---------------------------------------------------------------------------

/// Outcome of applying a `player_presented` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// A new lot is up; the countdown should be armed for this many seconds.
    Accepted { timer_seconds: u32 },
    /// Redelivery of the lot already on the block; bid state untouched.
    Duplicate,
    /// The auction already completed; ignored.
    Terminal,
}

/// Outcome of applying a `bid_placed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidOutcome {
    Accepted,
    /// The bid references a lot that is not the current one.
    StaleLot,
    /// The bid does not raise the current high bid; discarded.
    NonIncreasing,
    Terminal,
}

/// Outcome of applying a `player_sold` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoldOutcome {
    Accepted {
        /// Whether the winning team was found in the team list.
        team_known: bool,
    },
    StaleLot,
    Terminal,
}

// ---------------------------------------------------------------------------
// AuctionView
// ---------------------------------------------------------------------------

/// The reconciled, authoritative-as-known-locally auction state.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionView {
    pub phase: Phase,
    pub current_player: Option<PlayerInfo>,
    pub current_bid: u32,
    pub highest_bidder: Option<String>,
    pub teams: Vec<TeamState>,
}

impl AuctionView {
    /// Empty view, before any snapshot.
    pub fn new() -> Self {
        AuctionView {
            phase: Phase::Idle,
            current_player: None,
            current_bid: 0,
            highest_bidder: None,
            teams: Vec::new(),
        }
    }

    /// Replace the whole view with a fresh full snapshot.
    ///
    /// This is a replacement, never a field-by-field merge: after a
    /// reconnect the accumulated local state cannot be trusted. Returns the
    /// countdown duration to arm, when a lot is live.
    pub fn apply_snapshot(&mut self, snapshot: &StateSnapshot, default_timer: u32) -> Option<u32> {
        if self.phase == Phase::Completed && !snapshot.auction_complete {
            debug!("ignoring snapshot that predates completion");
            return None;
        }
        self.teams = snapshot.teams.iter().map(TeamState::from).collect();
        self.replace_lot_state(
            snapshot.current_player.clone(),
            snapshot.current_bid,
            snapshot.highest_bidder.clone(),
            snapshot.timer_remaining,
            snapshot.auction_complete,
            default_timer,
        )
    }

    /// Apply the push-channel snapshot variant (`auction_state`), which
    /// restates lot state but carries no team list.
    pub fn apply_push_state(
        &mut self,
        payload: &AuctionStatePayload,
        default_timer: u32,
    ) -> Option<u32> {
        if self.phase == Phase::Completed && !payload.auction_complete {
            debug!("ignoring state restatement that predates completion");
            return None;
        }
        self.replace_lot_state(
            payload.current_player.clone(),
            payload.current_bid,
            payload.highest_bidder.clone(),
            payload.timer_remaining,
            payload.auction_complete,
            default_timer,
        )
    }

    fn replace_lot_state(
        &mut self,
        player: Option<PlayerInfo>,
        bid: u32,
        bidder: Option<String>,
        timer_remaining: Option<u32>,
        complete: bool,
        default_timer: u32,
    ) -> Option<u32> {
        self.current_player = player;
        self.current_bid = bid;
        self.highest_bidder = bidder;
        self.phase = if complete {
            Phase::Completed
        } else if self.current_player.is_some() {
            Phase::Active
        } else {
            Phase::Idle
        };
        if self.phase == Phase::Active {
            Some(timer_remaining.unwrap_or(default_timer))
        } else {
            None
        }
    }

    /// A new lot was presented. Always supersedes whatever lot state was
    /// held before; a redelivery of the current lot is ignored so an
    /// at-least-once transport cannot reset live bidding.
    pub fn apply_presented(
        &mut self,
        payload: &PlayerPresentedPayload,
        default_timer: u32,
    ) -> PresentOutcome {
        if self.phase == Phase::Completed {
            debug!(
                player = %payload.player.name,
                "ignoring player_presented after completion"
            );
            return PresentOutcome::Terminal;
        }
        if self.phase == Phase::Active
            && self
                .current_player
                .as_ref()
                .is_some_and(|p| p.id == payload.player.id)
        {
            debug!(
                player = %payload.player.name,
                "duplicate player_presented for the current lot, ignoring"
            );
            return PresentOutcome::Duplicate;
        }

        self.current_player = Some(payload.player.clone());
        self.current_bid = payload.current_bid;
        self.highest_bidder = None;
        self.phase = Phase::Active;
        PresentOutcome::Accepted {
            timer_seconds: payload.timer_duration.unwrap_or(default_timer),
        }
    }

    /// A bid was placed. Applied only when it is scoped to the current lot
    /// and actually raises the high bid.
    pub fn apply_bid(&mut self, payload: &BidPlacedPayload) -> BidOutcome {
        if self.phase == Phase::Completed {
            return BidOutcome::Terminal;
        }
        let Some(current) = self.current_player.as_ref() else {
            debug!(
                player_id = payload.player_id,
                "bid_placed with no lot on the block, discarding"
            );
            return BidOutcome::StaleLot;
        };
        if current.id != payload.player_id {
            debug!(
                bid_player = payload.player_id,
                current_player = current.id,
                "bid_placed for a superseded lot, discarding"
            );
            return BidOutcome::StaleLot;
        }

        // The first bid may equal the opening price; after that the high
        // bid must strictly increase. The server should never send a lower
        // "winning" bid, so one is treated as malformed and dropped.
        let raises = payload.current_highest > self.current_bid
            || (self.highest_bidder.is_none() && payload.current_highest >= self.current_bid);
        if !raises {
            warn!(
                bid = payload.current_highest,
                current = self.current_bid,
                username = %payload.username,
                "non-increasing bid_placed, discarding"
            );
            return BidOutcome::NonIncreasing;
        }

        self.current_bid = payload.current_highest;
        self.highest_bidder = Some(payload.highest_bidder.clone());
        BidOutcome::Accepted
    }

    /// The current lot sold. Clears the lot and credits the winner's squad;
    /// the purse itself moves on the follow-up `purse_updated`.
    pub fn apply_sold(&mut self, payload: &PlayerSoldPayload) -> SoldOutcome {
        if self.phase == Phase::Completed {
            return SoldOutcome::Terminal;
        }
        let matches_current = self
            .current_player
            .as_ref()
            .is_some_and(|p| p.id == payload.player.id);
        if !matches_current {
            debug!(
                sold_player = payload.player.id,
                "player_sold for a lot that is not current, discarding"
            );
            return SoldOutcome::StaleLot;
        }

        let team_known = match self
            .teams
            .iter_mut()
            .find(|t| t.username == payload.sold_to)
        {
            Some(team) => {
                team.squad_size += 1;
                true
            }
            None => {
                warn!(
                    sold_to = %payload.sold_to,
                    "player_sold attributed to an unknown team, squad not updated"
                );
                false
            }
        };

        // Last bid and bidder stay visible through the settling gap.
        self.current_player = None;
        self.phase = Phase::Settling;
        SoldOutcome::Accepted { team_known }
    }

    /// Absolute purse restatement for one team. Unknown identities are
    /// ignored; returns whether a team was updated.
    pub fn apply_purse(&mut self, payload: &PurseUpdatedPayload) -> bool {
        match self
            .teams
            .iter_mut()
            .find(|t| t.username == payload.username)
        {
            Some(team) => {
                if payload.new_purse > team.purse_left {
                    warn!(
                        username = %payload.username,
                        old = team.purse_left,
                        new = payload.new_purse,
                        "purse_updated increased a purse outside a snapshot"
                    );
                }
                team.purse_left = payload.new_purse;
                true
            }
            None => {
                warn!(
                    username = %payload.username,
                    "purse_updated for an unknown team, ignoring"
                );
                false
            }
        }
    }

    /// The auction finished. Terminal; returns `false` on redelivery.
    pub fn apply_completed(&mut self) -> bool {
        if self.phase == Phase::Completed {
            debug!("duplicate auction_completed, ignoring");
            return false;
        }
        self.phase = Phase::Completed;
        true
    }
}

impl Default for AuctionView {
    fn default() -> Self {
        Self::new()
    }
}
