//! Per-connection reply path.
//!
//! A [`Responder`] is bound to exactly one connection when a frame arrives
//! and travels with the resulting [`Request`]. Replies therefore land on the
//! originating connection regardless of how many clients are connected or
//! how long verification took.

use std::fmt;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::errors::TransportError;
use crate::metrics::WS_SEND_FAILURES_TOTAL;
use crate::types::{ErrorFrame, Request, ResponseFrame};

/// Outbound text sink for one connection.
///
/// Implemented by the WebSocket connection; tests use an in-memory sink.
pub trait FrameSink: Send + Sync {
    /// Id of the connection behind this sink.
    fn connection_id(&self) -> &str;

    /// Queue one text frame. Must not block.
    fn send_text(&self, text: String) -> Result<(), TransportError>;
}

/// Cloneable handle that serializes frames onto a [`FrameSink`].
#[derive(Clone)]
pub struct Responder {
    sink: Arc<dyn FrameSink>,
}

impl Responder {
    /// Wrap a connection sink.
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self { sink }
    }

    /// Id of the bound connection.
    pub fn connection_id(&self) -> &str {
        self.sink.connection_id()
    }

    /// Send `{id?, response: value}`, copying the id from `request`.
    ///
    /// Failures are logged and counted; returns whether the frame was queued.
    pub fn send(&self, request: Option<&Request>, value: impl Serialize) -> bool {
        self.report(self.try_send(request, value))
    }

    /// Send `{id?, error: message}`, copying the id from `request`.
    pub fn send_error(&self, request: Option<&Request>, message: &str) -> bool {
        self.send_error_frame(request.and_then(|r| r.id.as_ref()), message)
    }

    /// Send `{id?, error: message}` with an explicit id.
    pub fn send_error_frame(&self, id: Option<&Value>, message: &str) -> bool {
        self.report(self.try_send_error(id, message))
    }

    /// Like [`send`](Self::send) but returns the failure instead of logging it.
    pub fn try_send(
        &self,
        request: Option<&Request>,
        value: impl Serialize,
    ) -> Result<(), TransportError> {
        let frame = ResponseFrame {
            id: request.and_then(|r| r.id.clone()),
            response: value,
        };
        self.sink.send_text(serde_json::to_string(&frame)?)
    }

    /// Like [`send_error_frame`](Self::send_error_frame) but returns the failure.
    pub fn try_send_error(&self, id: Option<&Value>, message: &str) -> Result<(), TransportError> {
        let frame = ErrorFrame {
            id: id.cloned(),
            error: message.to_owned(),
        };
        self.sink.send_text(serde_json::to_string(&frame)?)
    }

    fn report(&self, result: Result<(), TransportError>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                counter!(WS_SEND_FAILURES_TOTAL, "reason" => err.reason()).increment(1);
                warn!(conn_id = %self.connection_id(), error = %err, "failed to send frame");
                false
            }
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("connection_id", &self.connection_id())
            .finish()
    }
}
