//! WebSocket push-channel listener.
//!
//! Connects to the backend's push endpoint and re-broadcasts status events
//! so workers can react without waiting out the poll interval. The poll
//! loop stays correct when the channel is silent, so a dropped connection
//! degrades latency, not semantics; the listener simply reconnects with a
//! fixed delay until cancelled.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};
use tokio_util::sync::CancellationToken;

use crate::messages::{parse_event, PushEvent};

/// Broadcast channel capacity for push events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Reconnection delay after a WebSocket failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How long shutdown waits for the listener task to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the long-lived listener task and the event fan-out.
pub struct PushListener {
    event_tx: broadcast::Sender<PushEvent>,
    task_handle: tokio::task::JoinHandle<()>,
}

impl PushListener {
    /// Spawn the listener against `ws_url` (e.g. `ws://host:8188`).
    ///
    /// A unique `clientId` (UUID v4) is appended to the handshake URL so
    /// the backend can address events to this specific client. Safe to call
    /// before any job is submitted; events for unknown handles are simply
    /// not consumed by anyone.
    pub fn spawn(ws_url: String, cancel: CancellationToken) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let tx = event_tx.clone();
        let task_handle = tokio::spawn(async move {
            run(ws_url, tx, cancel).await;
            tracing::info!("Push listener task exited");
        });
        Self {
            event_tx,
            task_handle,
        }
    }

    /// Subscribe to push events; each worker holds its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.event_tx.subscribe()
    }

    /// Handle to the event fan-out, for wiring into the worker pool.
    pub fn events(&self) -> broadcast::Sender<PushEvent> {
        self.event_tx.clone()
    }

    /// Wait (bounded) for the listener task to finish after cancellation.
    pub async fn shutdown(self) {
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, self.task_handle).await;
    }
}

/// Core listener loop: connect -> process frames -> reconnect.
async fn run(ws_url: String, event_tx: broadcast::Sender<PushEvent>, cancel: CancellationToken) {
    loop {
        let client_id = uuid::Uuid::new_v4();
        let url = format!("{ws_url}/ws?clientId={client_id}");
        tracing::info!(url = %url, "Connecting to push channel");

        tokio::select! {
            _ = cancel.cancelled() => return,
            connected = connect_async(&url) => match connected {
                Ok((ws_stream, _response)) => {
                    tracing::info!("Push channel connected");
                    process_frames(ws_stream, &event_tx, &cancel).await;
                    tracing::warn!("Push channel session ended");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Push channel connection failed");
                }
            }
        }

        if cancel.is_cancelled() {
            return;
        }

        // Wait before the next attempt, respecting cancellation.
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

/// Read frames until the connection drops or the token is cancelled.
async fn process_frames(
    mut ws_stream: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    event_tx: &broadcast::Sender<PushEvent>,
    cancel: &CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            frame = ws_stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match parse_event(&text) {
                    Ok(event) => {
                        tracing::debug!(
                            remote_handle = %event.remote_handle,
                            state = ?event.state,
                            "Push event",
                        );
                        let _ = event_tx.send(event);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, raw = %text, "Unknown or malformed push frame");
                    }
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Handled automatically by tungstenite.
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Backend closed push channel");
                    return;
                }
                Some(Ok(_)) => {
                    // Binary / Frame: ignore.
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Push channel receive error");
                    return;
                }
                None => {
                    tracing::info!("Push channel stream exhausted");
                    return;
                }
            }
        }
    }
}
