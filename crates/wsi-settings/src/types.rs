//! Settings types.
//!
//! All sections deserialize with `#[serde(default)]`, so a settings file only
//! needs the keys it overrides.

use std::fmt;

use serde::{Deserialize, Serialize};
use wsi_core::logging::LogFormat;

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WsiSettings {
    /// Network and connection limits.
    pub server: ServerSettings,
    /// Token verification.
    pub auth: AuthSettings,
    /// Request dispatch behaviour.
    pub dispatch: DispatchSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl WsiSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("server.host is empty".into()));
        }
        if s.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be at least 1".into(),
            ));
        }
        if s.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if s.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be at least 1".into(),
            ));
        }
        if s.heartbeat_interval_secs == 0 || s.heartbeat_timeout_secs < s.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "heartbeat timeout ({}s) must be >= interval ({}s) and interval > 0",
                s.heartbeat_timeout_secs, s.heartbeat_interval_secs
            )));
        }
        if self.auth.algorithms.is_empty() {
            return Err(SettingsError::InvalidValue(
                "auth.algorithms must list at least one algorithm".into(),
            ));
        }
        Ok(())
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a client after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before sends start failing.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8585,
            max_connections: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 16 * 1024 * 1024,
            send_queue_capacity: 1024,
        }
    }
}

/// Token verification settings.
///
/// HMAC algorithms use `secret`; RSA, PSS, EC and `EdDSA` read a PEM public
/// key from `public_key_path`. With neither set, every auth-gated method
/// answers "Authorization Required".
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Shared HMAC secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Path to a PEM-encoded public key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_path: Option<String>,
    /// Accepted JWT `alg` values; all must belong to one key family.
    pub algorithms: Vec<String>,
    /// Clock skew tolerance for `exp` / `nbf`, in seconds.
    pub leeway_secs: u64,
    /// Required `iss` claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Required `aud` claim. When unset, `aud` is not checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            secret: None,
            public_key_path: None,
            algorithms: vec!["HS256".into(), "HS384".into(), "HS512".into()],
            leeway_secs: 0,
            issuer: None,
            audience: None,
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("public_key_path", &self.public_key_path)
            .field("algorithms", &self.algorithms)
            .field("leeway_secs", &self.leeway_secs)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

/// Dispatch settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Await token verification inline, so each connection's messages are
    /// handled strictly in arrival order.
    pub ordered: bool,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
