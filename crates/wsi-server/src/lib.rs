//! # wsi-server
//!
//! Axum HTTP + `WebSocket` front end for [`wsi_rpc::Dispatcher`].
//!
//! - `GET /ws`: one session per client, frames handed to the dispatcher
//! - `GET /health`, `GET /metrics`
//! - Connection tracking with a hard cap, ping/pong heartbeat
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::WsiServer;
