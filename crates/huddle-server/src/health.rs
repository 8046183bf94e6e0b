//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

/// Liveness snapshot served at `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the server accepts work.
    pub status: &'static str,
    /// Whole seconds since startup.
    pub uptime_secs: u64,
    /// Open `WebSocket` sessions.
    pub connections: usize,
    /// Storage mutations accepted but not yet finished.
    pub pending_writes: usize,
}

/// Snapshot the server's counters.
pub fn health_check(started: Instant, connections: usize, pending_writes: usize) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: started.elapsed().as_secs(),
        connections,
        pending_writes,
    }
}
