//! Metric names shared by moltis crates, plus the `metrics` facade macros.
//!
//! Crates record through `moltis_metrics::{counter, gauge, histogram}` behind
//! their own `metrics` cargo feature. Nothing is exported until the host
//! process installs a recorder.

pub use metrics::{counter, gauge, histogram};

/// Gateway WebSocket client metrics.
pub mod gateway_client {
    /// Completed requests, labelled by `result` (`ok`, `rpc_error`,
    /// `timeout`, `closed`, `not_connected`).
    pub const REQUESTS_TOTAL: &str = "moltis_gateway_client_requests_total";
    /// Time from sending a `req` frame to its outcome.
    pub const REQUEST_DURATION_SECONDS: &str = "moltis_gateway_client_request_duration_seconds";
    /// Reconnect attempts, labelled by `result` (`ok`, `error`).
    pub const RECONNECTS_TOTAL: &str = "moltis_gateway_client_reconnects_total";
    /// Inbound frames that could not be parsed.
    pub const FRAMES_DROPPED_TOTAL: &str = "moltis_gateway_client_frames_dropped_total";
    /// 1 while the handshake has completed and the socket is open, else 0.
    pub const CONNECTED: &str = "moltis_gateway_client_connected";
}
