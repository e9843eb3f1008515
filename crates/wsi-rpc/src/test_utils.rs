//! In-memory [`FrameSink`] for exercising dispatch without a socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::errors::TransportError;
use crate::responder::{FrameSink, Responder};

/// Records every frame sent to it.
pub struct RecordingSink {
    id: String,
    frames: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl RecordingSink {
    /// Create an open sink for connection `id`.
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_owned(),
            frames: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// A responder writing into this sink.
    pub fn responder(self: &Arc<Self>) -> Responder {
        Responder::new(self.clone())
    }

    /// Raw frames in send order.
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    /// Frames parsed as JSON. Unparsable frames become `Value::Null`.
    pub fn json_frames(&self) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap_or(Value::Null))
            .collect()
    }

    /// Reject all further sends with [`TransportError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

impl FrameSink for RecordingSink {
    fn connection_id(&self) -> &str {
        &self.id
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        self.frames.lock().push(text);
        Ok(())
    }
}
