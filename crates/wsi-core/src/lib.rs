//! # wsi-core
//!
//! Foundation types shared by every wsi crate.
//!
//! - **Connection ids**: [`ids::ConnectionId`], a UUID v7 newtype
//! - **Logging**: `tracing` subscriber setup and an in-memory capture layer for tests

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
