//! Per-client state shared between a session's reader, writer and the
//! dispatcher's responders.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use wsi_core::ids::ConnectionId;
use wsi_rpc::{FrameSink, TransportError};

/// One upgraded WebSocket client.
///
/// Replies go onto a bounded queue that the session writer drains; a full
/// queue drops the frame rather than stalling the caller.
pub struct ClientConnection {
    /// Server-assigned identity, `conn_` prefixed.
    pub id: ConnectionId,
    outbound: mpsc::Sender<String>,
    /// Upgrade time.
    pub connected_at: Instant,
    seen_since_ping: AtomicBool,
    last_seen: Mutex<Instant>,
    dispatching: AtomicBool,
    dropped: AtomicU64,
}

/// Marks the connection busy until dropped. See [`ClientConnection::busy`].
pub struct BusyGuard<'a>(&'a ClientConnection);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.dispatching.store(false, Ordering::Relaxed);
        self.0.mark_alive();
    }
}

impl ClientConnection {
    /// Wrap an existing queue sender.
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            outbound,
            connected_at: now,
            seen_since_ping: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dispatching: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Fresh id plus a queue holding at most `capacity` frames (minimum 1).
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(ConnectionId::new(), tx), rx)
    }

    /// Frames lost to a full or closed queue.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record inbound traffic of any kind, pongs included.
    pub fn mark_alive(&self) {
        self.seen_since_ping.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the client was last heard from.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Consume the heard-from flag; `false` means silence since the last call.
    pub fn check_alive(&self) -> bool {
        self.seen_since_ping.swap(false, Ordering::Relaxed)
    }

    /// Flag the reader as occupied with a frame.
    ///
    /// Pongs are not read while a frame is dispatched, so the heartbeat must
    /// not count that time as silence. Dropping the guard refreshes
    /// [`last_pong_elapsed`](Self::last_pong_elapsed).
    pub fn busy(&self) -> BusyGuard<'_> {
        self.dispatching.store(true, Ordering::Relaxed);
        BusyGuard(self)
    }

    /// Whether a [`BusyGuard`] is alive.
    pub fn is_busy(&self) -> bool {
        self.dispatching.load(Ordering::Relaxed)
    }

    /// Time since upgrade.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl FrameSink for ClientConnection {
    fn connection_id(&self) -> &str {
        self.id.as_str()
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.outbound.try_send(text).map_err(|e| {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(_) => TransportError::Full,
                TrySendError::Closed(_) => TransportError::Closed,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ClientConnection::new(ConnectionId::from("conn_1"), tx), rx)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection(4);
        assert_eq!(conn.connection_id(), "conn_1");
        assert_eq!(conn.drop_count(), 0);
        assert!(conn.check_alive());
    }

    #[test]
    fn send_text_queues_frame() {
        let (conn, mut rx) = make_connection(4);
        conn.send_text("hello".into()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn full_queue_is_reported_and_counted() {
        let (conn, _rx) = make_connection(1);
        conn.send_text("a".into()).unwrap();
        assert_matches!(conn.send_text("b".into()), Err(TransportError::Full));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn closed_queue_is_reported() {
        let (conn, rx) = make_connection(4);
        drop(rx);
        assert_matches!(conn.send_text("x".into()), Err(TransportError::Closed));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn check_alive_resets_flag() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn mark_alive_resets_pong_clock() {
        let (conn, _rx) = make_connection(4);
        conn.mark_alive();
        assert!(conn.last_pong_elapsed() < Duration::from_secs(1));
        assert!(conn.age() < Duration::from_secs(1));
    }

    #[test]
    fn busy_guard_refreshes_liveness_on_drop() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.check_alive());
        {
            let _busy = conn.busy();
            assert!(conn.is_busy());
            assert!(!conn.check_alive());
        }
        assert!(!conn.is_busy());
        assert!(conn.check_alive());
        assert!(conn.last_pong_elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn with_capacity_generates_id() {
        let (a, _ra) = ClientConnection::with_capacity(2);
        let (b, _rb) = ClientConnection::with_capacity(0);
        assert!(a.connection_id().starts_with("conn_"));
        assert_ne!(a.id, b.id);
        b.send_text("x".into()).unwrap();
    }
}
