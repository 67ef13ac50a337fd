// Configuration loading and parsing (auction.toml).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// auction.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire auction.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    server: ServerSection,
    room: RoomSection,
    #[serde(default)]
    timing: TimingSection,
    #[serde(default)]
    transport: TransportSection,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerSection {
    api_url: String,
    socket_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RoomSection {
    code: String,
    username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingSection {
    /// Fallback bidding-clock duration when the server omits one.
    #[serde(default = "default_timer_seconds")]
    pub default_timer_seconds: u32,
    /// Countdown refresh cadence. Display granularity only; correctness
    /// comes from the deadline arithmetic, not from tick counting.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// How long a server bid rejection stays visible before auto-clearing.
    #[serde(default = "default_bid_error_seconds")]
    pub bid_error_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportSection {
    /// Reconnection attempts before the transport gives up.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    /// Initial reconnection delay; doubles per attempt.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Upper bound on the doubling reconnection delay.
    #[serde(default = "default_reconnect_delay_max_ms")]
    pub reconnect_delay_max_ms: u64,
}

fn default_timer_seconds() -> u32 {
    30
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_bid_error_seconds() -> u64 {
    3
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_reconnect_delay_max_ms() -> u64 {
    5000
}

impl Default for TimingSection {
    fn default() -> Self {
        TimingSection {
            default_timer_seconds: default_timer_seconds(),
            tick_interval_ms: default_tick_interval_ms(),
            bid_error_seconds: default_bid_error_seconds(),
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        TransportSection {
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_delay_max_ms: default_reconnect_delay_max_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

/// The assembled, validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL for the HTTP API (snapshot fetches), e.g.
    /// `http://localhost:5000/api`.
    pub api_url: String,
    /// WebSocket URL for the push transport, e.g. `ws://localhost:5000/ws`.
    pub socket_url: String,
    /// Room this client participates in.
    pub room_code: String,
    /// Identity established by the lobby; the engine trusts it as-is.
    pub username: String,
    pub timing: TimingSection,
    pub transport: TransportSection,
}

/// Load and validate configuration from the given path.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&raw, path)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(raw: &str, path: &Path) -> Result<Config, ConfigError> {
    let file: ConfigFile = toml::from_str(raw).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })?;

    let config = Config {
        api_url: file.server.api_url.trim_end_matches('/').to_string(),
        socket_url: file.server.socket_url,
        room_code: file.room.code,
        username: file.room.username,
        timing: file.timing,
        transport: file.transport,
    };
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.api_url.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "server.api_url".into(),
            message: "must not be empty".into(),
        });
    }
    if !config.socket_url.starts_with("ws://") && !config.socket_url.starts_with("wss://") {
        return Err(ConfigError::ValidationError {
            field: "server.socket_url".into(),
            message: "must be a ws:// or wss:// URL".into(),
        });
    }
    if config.room_code.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "room.code".into(),
            message: "must not be empty".into(),
        });
    }
    if config.username.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "room.username".into(),
            message: "must not be empty".into(),
        });
    }
    if config.timing.tick_interval_ms == 0 {
        return Err(ConfigError::ValidationError {
            field: "timing.tick_interval_ms".into(),
            message: "must be greater than zero".into(),
        });
    }
    if config.timing.default_timer_seconds == 0 {
        return Err(ConfigError::ValidationError {
            field: "timing.default_timer_seconds".into(),
            message: "must be greater than zero".into(),
        });
    }
    Ok(())
}
