//! Names of the metrics recorded while dispatching and replying.

/// Requests routed to a registered method (counter, labels: `method`).
pub const RPC_REQUESTS_TOTAL: &str = "rpc_requests_total";
/// Rejected or failed requests (counter, labels: `error_type`).
pub const RPC_ERRORS_TOTAL: &str = "rpc_errors_total";
/// Token verifications (counter, labels: `outcome`).
pub const AUTH_VERIFICATIONS_TOTAL: &str = "auth_verifications_total";
/// Token verification latency (histogram).
pub const AUTH_VERIFICATION_DURATION_SECONDS: &str = "auth_verification_duration_seconds";
/// Frames that could not be queued (counter, labels: `reason`).
pub const WS_SEND_FAILURES_TOTAL: &str = "ws_send_failures_total";
