//! # wsi-rpc
//!
//! JSON method-invocation protocol carried over WebSocket text frames.
//!
//! - Wire format: `{method, id?, authorization?, ...}` in,
//!   `{id?, response}` / `{id?, error}` out
//! - [`registry::MethodRegistry`]: method name → handler + `requires_auth` flag
//! - [`auth::JwtVerifier`]: signed-token verification via `jsonwebtoken`
//! - [`dispatcher::Dispatcher`]: parse, route, gate, invoke
//! - [`responder::Responder`]: writes frames back to the connection a request came from

#![deny(unsafe_code)]

pub mod auth;
pub mod dispatcher;
pub mod errors;
pub mod metrics;
pub mod registry;
pub mod responder;
pub mod test_utils;
pub mod types;

pub use auth::{Claims, JwtVerifier, TokenVerifier};
pub use dispatcher::{Dispatch, DispatchMode, Dispatcher};
pub use errors::{AuthError, DispatchError, TransportError};
pub use registry::{MethodDescriptor, MethodHandler, MethodRegistry, handler_fn};
pub use responder::{FrameSink, Responder};
pub use types::{ErrorFrame, Frame, Inbound, MethodField, Request, ResponseFrame};
