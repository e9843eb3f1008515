//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

/// Liveness snapshot served as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while accepting sessions, `"draining"` once shutdown began.
    pub status: &'static str,
    /// Whole seconds since the server was built.
    pub uptime_secs: u64,
    /// Open WebSocket sessions.
    pub connections: usize,
    /// Methods the dispatcher knows about.
    pub methods: usize,
}

/// Assemble the snapshot from the server's live counters.
pub fn health_check(
    started: Instant,
    connections: usize,
    methods: usize,
    draining: bool,
) -> HealthResponse {
    HealthResponse {
        status: if draining { "draining" } else { "ok" },
        uptime_secs: started.elapsed().as_secs(),
        connections,
        methods,
    }
}
