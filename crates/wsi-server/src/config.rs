//! Listener and per-session limits, derived from [`ServerSettings`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wsi_settings::ServerSettings;

/// Runtime configuration for [`crate::WsiServer`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to listen on; loopback unless configured.
    pub host: String,
    /// TCP port; `0` lets the OS choose.
    pub port: u16,
    /// Upgrades beyond this many open sessions get a 503.
    pub max_connections: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Disconnect after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
}

impl ServerConfig {
    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Pong timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 16 << 20,
            send_queue_capacity: 1024,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            heartbeat_timeout_secs: s.heartbeat_timeout_secs,
            max_message_size: s.max_message_size,
            send_queue_capacity: s.send_queue_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.max_connections, 256);
        assert_eq!(cfg.max_message_size, 16 * 1024 * 1024);
        assert_eq!(cfg.send_queue_capacity, 1024);
    }

    #[test]
    fn durations() {
        let cfg = ServerConfig {
            heartbeat_interval_secs: 15,
            heartbeat_timeout_secs: 45,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(15));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8585,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8585");
    }

    #[test]
    fn from_settings_copies_every_field() {
        let settings = ServerSettings {
            host: "10.0.0.1".into(),
            port: 3000,
            max_connections: 5,
            heartbeat_interval_secs: 10,
            heartbeat_timeout_secs: 30,
            max_message_size: 512,
            send_queue_capacity: 8,
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.host, "10.0.0.1");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.heartbeat_interval_secs, 10);
        assert_eq!(cfg.heartbeat_timeout_secs, 30);
        assert_eq!(cfg.max_message_size, 512);
        assert_eq!(cfg.send_queue_capacity, 8);
    }
}
