// Auction sync client entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, env-filtered)
// 2. Load config
// 3. Spawn the WebSocket transport
// 4. Spawn the reconciliation engine
// 5. Run the console render loop until completion or Ctrl+C

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};

use auction_sync::app;
use auction_sync::config;
use auction_sync::protocol::{ConnectionStatus, UserCommand, ViewSnapshot, ViewUpdate};
use auction_sync::snapshot::{HttpSnapshotClient, SnapshotClient};
use auction_sync::transport;

/// How long the completion message stays on screen before the client exits.
const COMPLETION_GRACE: std::time::Duration = std::time::Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    // 2. Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "auction.toml".to_string());
    let config = config::load_config(&config_path).context("failed to load configuration")?;
    info!(
        "Config loaded: room={}, identity={}, server={}",
        config.room_code, config.username, config.socket_url
    );

    // 3. Spawn the WebSocket transport (owned handle, torn down with us)
    let (transport, transport_rx, transport_task) =
        transport::spawn(config.socket_url.clone(), config.transport.clone());

    let snapshot_client: Arc<dyn SnapshotClient> =
        Arc::new(HttpSnapshotClient::new(config.api_url.clone()));

    // 4. Spawn the reconciliation engine
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (ui_tx, mut ui_rx) = mpsc::channel(256);
    let engine_task = tokio::spawn(app::run(
        config.clone(),
        transport.clone(),
        transport_rx,
        snapshot_client,
        cmd_rx,
        ui_tx,
    ));

    // 5. Console render loop
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, leaving room");
                let _ = cmd_tx.send(UserCommand::Leave).await;
                break;
            }
            update = ui_rx.recv() => {
                match update {
                    Some(ViewUpdate::State(state)) => render_state(&state),
                    Some(ViewUpdate::ConnectionStatus(status)) => {
                        match status {
                            ConnectionStatus::Connected => info!("connected to auction server"),
                            ConnectionStatus::Disconnected => warn!("disconnected from auction server"),
                        }
                    }
                    Some(ViewUpdate::Notice(notice)) => println!("* {notice}"),
                    Some(ViewUpdate::SnapshotFailed(message)) => {
                        warn!("could not load auction state: {message}; retrying");
                        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                        let _ = cmd_tx.send(UserCommand::RetrySnapshot).await;
                    }
                    Some(ViewUpdate::Completed { message }) => {
                        println!("=== {message} ===");
                        tokio::time::sleep(COMPLETION_GRACE).await;
                        let _ = cmd_tx.send(UserCommand::Leave).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Cleanup: wait for the engine to finish, then stop the transport.
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), engine_task).await;
    transport_task.abort();

    info!("auction sync client shut down cleanly");
    Ok(())
}

/// Print a one-line summary of the reconciled state.
fn render_state(state: &ViewSnapshot) {
    match &state.current_player {
        Some(player) => {
            let bidder = state.highest_bidder.as_deref().unwrap_or("-");
            println!(
                "[{:>3}s] {} ({}) bid={} by {}",
                state.seconds_remaining, player.name, player.role, state.current_bid, bidder
            );
        }
        None if state.auction_complete => println!("auction complete"),
        None => println!("waiting for the next player..."),
    }
    if let Some(error) = &state.bid_error {
        println!("  ! {error}");
    }
    if let Some(entry) = state.activity.first() {
        println!("  {} {}", entry.timestamp, entry.display());
    }
}

/// Initialize tracing to stderr so stdout stays free for the room display.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("auction_sync=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
