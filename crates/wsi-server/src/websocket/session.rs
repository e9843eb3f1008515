//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use wsi_rpc::{Dispatch, Dispatcher, Responder};

use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::websocket::connection::ClientConnection;
use crate::websocket::registry::ConnectionRegistry;

/// How long the writer gets to send a close frame after the reader stops.
const WRITER_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Heartbeat timing for a session.
///
/// Time spent dispatching a frame never counts towards `timeout`; pongs that
/// arrive meanwhile are read once the reader is free again.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// Interval between server-initiated pings.
    pub interval: Duration,
    /// Disconnect after this long without a pong.
    pub timeout: Duration,
}

/// Run a WebSocket session for a registered connection.
///
/// 1. Forwards queued outbound frames and sends periodic pings
/// 2. Feeds inbound text (and UTF-8 binary) frames to the dispatcher
/// 3. Ends on close frame, read error, heartbeat timeout or shutdown; an
///    in-flight dispatch is abandoned on shutdown
/// 4. Removes the connection from the registry
#[instrument(skip_all, fields(conn_id = %connection.id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection: Arc<ClientConnection>,
    mut send_rx: mpsc::Receiver<String>,
    dispatcher: Arc<Dispatcher>,
    connections: Arc<ConnectionRegistry>,
    heartbeat: Heartbeat,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let conn_id = connection.id.to_string();
    let responder = Responder::new(connection.clone());
    let session = shutdown.child_token();

    info!(conn_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let outbound_conn = connection.clone();
    let outbound_session = session.clone();
    let outbound = tokio::spawn(async move {
        let mut ping_interval =
            tokio::time::interval(heartbeat.interval.max(Duration::from_millis(10)));
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && !outbound_conn.is_busy()
                        && outbound_conn.last_pong_elapsed() > heartbeat.timeout
                    {
                        warn!(timeout = ?heartbeat.timeout, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_session.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        outbound_session.cancel();
    });

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = session.cancelled() => break,
        };
        let Some(Ok(msg)) = msg else { break };
        connection.mark_alive();

        let outcome = match msg {
            Message::Close(_) => {
                info!(conn_id, "client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            frame => {
                let _busy = connection.busy();
                tokio::select! {
                    outcome = dispatch_frame(&dispatcher, &responder, frame) => outcome,
                    () = session.cancelled() => {
                        debug!(conn_id, "shutdown interrupted an in-flight dispatch");
                        break;
                    }
                }
            }
        };
        if let Some(Dispatch::Verifying(_)) = outcome {
            debug!("token verification running in background");
        }
    }

    session.cancel();
    let _ = connections.remove(&conn_id);
    info!(
        conn_id,
        dropped = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());

    let writer = outbound.abort_handle();
    if tokio::time::timeout(WRITER_STOP_TIMEOUT, outbound).await.is_err() {
        debug!(conn_id, "outbound writer did not stop in time");
        writer.abort();
    }
}

async fn dispatch_frame(
    dispatcher: &Dispatcher,
    responder: &Responder,
    frame: Message,
) -> Option<Dispatch> {
    match frame {
        Message::Text(text) => Some(dispatcher.on_message(text.as_str(), responder).await),
        Message::Binary(data) => Some(match std::str::from_utf8(&data) {
            Ok(text) => dispatcher.on_message(text, responder).await,
            Err(_) => {
                debug!(len = data.len(), "received non-UTF8 binary frame");
                dispatcher.on_unreadable(responder)
            }
        }),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}
