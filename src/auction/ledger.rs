// Activity ledger: an ordered, newest-first log of accepted auction events.
//
// The ledger is a pure projection of the accepted-event stream: the
// reconciliation step decides acceptance, and each accepted event of a
// relevant kind appends exactly one entry here. Entries are immutable once
// appended. The ledger is capped; the cap sits far above anything a single
// auction produces.

/// Maximum retained entries. Oldest entries fall off past this point.
pub const LEDGER_CAP: usize = 512;

/// What an activity entry describes.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerKind {
    PlayerPresented {
        player_name: String,
    },
    BidPlaced {
        username: String,
        amount: u32,
    },
    PlayerSold {
        player_name: String,
        sold_to: String,
        price: u32,
    },
    AuctionCompleted {
        message: String,
    },
}

/// One immutable activity entry with a client-assigned display timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub kind: LedgerKind,
    /// Local wall-clock time of acceptance, for display only.
    pub timestamp: String,
}

impl LedgerEntry {
    /// Human-readable one-line rendering, in the auction room's wording.
    pub fn display(&self) -> String {
        match &self.kind {
            LedgerKind::PlayerPresented { player_name } => {
                format!("New Player: {player_name}")
            }
            LedgerKind::BidPlaced { username, amount } => {
                format!("{username} bid {amount}")
            }
            LedgerKind::PlayerSold {
                player_name,
                sold_to,
                price,
            } => format!("SOLD! {player_name} to {sold_to} for {price}"),
            LedgerKind::AuctionCompleted { message } => message.clone(),
        }
    }
}

/// Append-only, newest-first activity log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityLedger {
    entries: Vec<LedgerEntry>,
}

impl ActivityLedger {
    pub fn new() -> Self {
        ActivityLedger {
            entries: Vec::new(),
        }
    }

    /// Record an accepted event. The entry is stamped with the local time
    /// and prepended so the newest entry is always first.
    pub fn record(&mut self, kind: LedgerKind) {
        self.record_at(kind, chrono::Local::now().format("%H:%M:%S").to_string());
    }

    /// Record with an explicit timestamp string.
    pub fn record_at(&mut self, kind: LedgerKind, timestamp: String) {
        self.entries.insert(0, LedgerEntry { kind, timestamp });
        self.entries.truncate(LEDGER_CAP);
    }

    /// Entries, newest first.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
