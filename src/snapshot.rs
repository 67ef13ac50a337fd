// On-demand full-state snapshot fetch over HTTP.
//
// The snapshot is the authoritative restatement of auction state: fetched
// once on entering the room and again whenever the engine suspects it missed
// events (reconnect mid-auction). The client is a trait so the engine loop
// can be driven with an in-memory fetcher in tests.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::protocol::StateSnapshot;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A failed snapshot fetch. Always recoverable: the caller renders a retry
/// path instead of crashing.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("snapshot request for room {room_code} returned HTTP {status}")]
    Status {
        room_code: String,
        status: reqwest::StatusCode,
    },
}

// ---------------------------------------------------------------------------
// Client trait + HTTP implementation
// ---------------------------------------------------------------------------

/// Fetches the authoritative auction state for a room.
#[async_trait]
pub trait SnapshotClient: Send + Sync {
    async fn fetch_state(&self, room_code: &str) -> Result<StateSnapshot, SnapshotError>;
}

/// `SnapshotClient` backed by the room server's HTTP API.
pub struct HttpSnapshotClient {
    api_url: String,
    http: reqwest::Client,
}

impl HttpSnapshotClient {
    /// `api_url` is the API base, e.g. `http://localhost:5000/api`.
    pub fn new(api_url: impl Into<String>) -> Self {
        HttpSnapshotClient {
            api_url: api_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn state_url(&self, room_code: &str) -> String {
        format!(
            "{}/auction/{}/state",
            self.api_url.trim_end_matches('/'),
            room_code
        )
    }
}

#[async_trait]
impl SnapshotClient for HttpSnapshotClient {
    async fn fetch_state(&self, room_code: &str) -> Result<StateSnapshot, SnapshotError> {
        let url = self.state_url(room_code);
        debug!(%url, "fetching auction state snapshot");

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SnapshotError::Status {
                room_code: room_code.to_string(),
                status: response.status(),
            });
        }
        let snapshot = response.json::<StateSnapshot>().await?;
        Ok(snapshot)
    }
}
