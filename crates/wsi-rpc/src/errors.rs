//! Error types for dispatch, token verification and frame delivery.
//!
//! Only [`DispatchError`] messages ever reach a client. Verification failures
//! of every kind collapse into [`DispatchError::AuthorizationRequired`].

use thiserror::Error;

/// A request rejected before its handler ran.
///
/// `Display` is the exact text sent in the `error` field of the frame.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Unparsable payload, or `method` absent or falsy.
    #[error("No method supplied")]
    NoMethod,
    /// `method` is not registered, or is not a string.
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    /// Missing, invalid or expired authorization token.
    #[error("Authorization Required")]
    AuthorizationRequired,
}

impl DispatchError {
    /// Metric label for this rejection.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NoMethod => "no_method",
            Self::MethodNotFound(_) => "method_not_found",
            Self::AuthorizationRequired => "unauthorized",
        }
    }
}

/// Why a token failed verification. Logged, never sent to clients.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No verification key is configured.
    #[error("no verification key configured")]
    NotConfigured,
    /// The token's `exp` is in the past.
    #[error("token expired")]
    Expired,
    /// Bad signature, malformed token, wrong algorithm or failed claim check.
    #[error("invalid token: {0}")]
    Invalid(String),
    /// The verifier could not be built from settings.
    #[error("invalid auth configuration: {0}")]
    Config(String),
}

impl AuthError {
    /// Metric label for this failure.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Expired => "expired",
            Self::Invalid(_) => "invalid",
            Self::Config(_) => "config",
        }
    }
}

/// Failure to deliver a frame to a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The frame could not be serialized.
    #[error("failed to serialize frame: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The connection's outbound queue is closed.
    #[error("connection closed")]
    Closed,
    /// The connection's outbound queue is full.
    #[error("send queue full")]
    Full,
}

impl TransportError {
    /// Metric label for this failure.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Serialize(_) => "serialize",
            Self::Closed => "closed",
            Self::Full => "full",
        }
    }
}
