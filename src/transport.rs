// WebSocket push transport with automatic reconnection.
//
// The transport is an explicitly owned handle plus an ordered event intake,
// never a process-wide singleton: the engine creates it, consumes its
// receiver, and drops both on teardown. Each (re)established connection
// increments a connection epoch so the consumer can tell when in-flight
// messages may have been lost and a fresh snapshot is needed. The transport
// itself remembers nothing about room membership across reconnects; the
// consumer re-joins on every `Connected`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream, Stream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::TransportSection;
use crate::protocol::{ClientRequest, ServerEvent};

/// Events emitted by the transport to the engine loop.
///
/// Delivered in order; events following a `Connected { epoch }` belong to
/// that connection segment until the next `Disconnected`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection segment was established. Epochs start at 1 and increase
    /// on every reconnect.
    Connected { epoch: u64 },
    /// The current segment ended; in-flight messages may be lost.
    Disconnected,
    /// A server-pushed event, parsed off the wire.
    Event(ServerEvent),
}

/// Owned sending half of the transport.
///
/// `send` is fire-and-forget: while the socket is down the request is
/// dropped with a warning, never an error. Bids lost this way are acceptable;
/// blocking the caller is not.
#[derive(Clone)]
pub struct TransportHandle {
    outgoing: mpsc::Sender<ClientRequest>,
    connected: Arc<AtomicBool>,
}

impl TransportHandle {
    pub fn send(&self, request: ClientRequest) {
        if !self.connected.load(Ordering::Acquire) {
            warn!(?request, "transport not connected, dropping outgoing request");
            return;
        }
        if let Err(e) = self.outgoing.try_send(request) {
            warn!("failed to queue outgoing request: {e}");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Build a handle over an explicit outgoing channel and connected flag.
    /// `spawn` uses this internally; tests use it to observe outgoing
    /// requests without a live socket.
    pub fn from_parts(
        outgoing: mpsc::Sender<ClientRequest>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        TransportHandle {
            outgoing,
            connected,
        }
    }
}

/// Spawn the transport task for `socket_url`.
///
/// Returns the sending handle, the ordered event intake, and the task handle.
/// The task runs until the event receiver is dropped or the reconnection
/// budget is exhausted; the receiver seeing the channel close means the
/// transport has given up for good.
pub fn spawn(
    socket_url: String,
    settings: TransportSection,
) -> (
    TransportHandle,
    mpsc::Receiver<TransportEvent>,
    JoinHandle<()>,
) {
    let (event_tx, event_rx) = mpsc::channel(256);
    let (outgoing_tx, outgoing_rx) = mpsc::channel(64);
    let connected = Arc::new(AtomicBool::new(false));

    let handle = TransportHandle::from_parts(outgoing_tx, Arc::clone(&connected));

    let task = tokio::spawn(run(socket_url, settings, event_tx, outgoing_rx, connected));
    (handle, event_rx, task)
}

/// Connection supervisor: connect, drive, reconnect with backoff.
async fn run(
    socket_url: String,
    settings: TransportSection,
    event_tx: mpsc::Sender<TransportEvent>,
    mut outgoing_rx: mpsc::Receiver<ClientRequest>,
    connected: Arc<AtomicBool>,
) {
    let mut epoch: u64 = 0;
    let mut failed_attempts: u32 = 0;
    let mut delay = Duration::from_millis(settings.reconnect_delay_ms);
    let delay_max = Duration::from_millis(settings.reconnect_delay_max_ms);

    loop {
        match tokio_tungstenite::connect_async(socket_url.as_str()).await {
            Ok((ws_stream, _)) => {
                epoch += 1;
                failed_attempts = 0;
                delay = Duration::from_millis(settings.reconnect_delay_ms);
                info!(epoch, "websocket connected to {socket_url}");

                connected.store(true, Ordering::Release);
                if event_tx
                    .send(TransportEvent::Connected { epoch })
                    .await
                    .is_err()
                {
                    return;
                }

                let (write, read) = ws_stream.split();
                let channel_open =
                    drive_connection(write, read, &mut outgoing_rx, &event_tx).await;

                connected.store(false, Ordering::Release);
                if !channel_open || event_tx.send(TransportEvent::Disconnected).await.is_err() {
                    return;
                }
                info!(epoch, "websocket connection lost");
            }
            Err(e) => {
                warn!("websocket connect to {socket_url} failed: {e}");
                failed_attempts += 1;
                if failed_attempts >= settings.reconnect_attempts {
                    warn!(
                        attempts = failed_attempts,
                        "reconnection budget exhausted, transport shutting down"
                    );
                    return;
                }
            }
        }

        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(delay_max);
    }
}

/// Drive one connection segment: forward outgoing requests onto the sink and
/// parsed incoming frames into the event channel. Returns `false` when the
/// event channel closed (consumer gone), `true` when the segment itself
/// ended and reconnection should proceed.
async fn drive_connection(
    mut write: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    mut read: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    outgoing_rx: &mut mpsc::Receiver<ClientRequest>,
    event_tx: &mpsc::Sender<TransportEvent>,
) -> bool {
    loop {
        tokio::select! {
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if forward_frame(&text, event_tx).await.is_err() {
                            return false;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!("server sent close frame");
                        return true;
                    }
                    Some(Ok(_)) => {
                        // Binary, Ping, Pong, Frame: nothing to do.
                    }
                    Some(Err(e)) => {
                        warn!("websocket read error: {e}");
                        return true;
                    }
                    None => return true,
                }
            }
            request = outgoing_rx.recv() => {
                match request {
                    Some(request) => {
                        let text = match serde_json::to_string(&request) {
                            Ok(t) => t,
                            Err(e) => {
                                warn!("failed to serialize outgoing request: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            warn!("websocket write failed: {e}");
                            return true;
                        }
                    }
                    // All handles dropped: the owner is gone.
                    None => return false,
                }
            }
        }
    }
}

/// Parse one text frame and forward it. `Err` means the event channel is
/// closed and the transport should stop.
async fn forward_frame(text: &str, event_tx: &mpsc::Sender<TransportEvent>) -> Result<(), ()> {
    match serde_json::from_str::<ServerEvent>(text) {
        Ok(ServerEvent::Unknown) => {
            debug!("ignoring unrecognized server event");
            Ok(())
        }
        Ok(event) => event_tx
            .send(TransportEvent::Event(event))
            .await
            .map_err(|_| ()),
        Err(e) => {
            warn!("failed to parse server frame: {e}");
            Ok(())
        }
    }
}

/// Forward parsed frames from any message stream into the event channel.
/// Pure logic over an in-memory stream; the primary unit-test target.
pub async fn process_message_stream<St>(
    mut stream: St,
    event_tx: &mpsc::Sender<TransportEvent>,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(item) = stream.next().await {
        match item {
            Ok(Message::Text(text)) => {
                forward_frame(&text, event_tx).await?;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("websocket error: {e}");
                break;
            }
        }
    }
    Ok(())
}
