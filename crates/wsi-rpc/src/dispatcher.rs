//! Inbound frame dispatch.
//!
//! One call to [`Dispatcher::on_message`] per inbound text frame:
//! parse → route → (verify) → invoke. Rejections produce exactly one error
//! frame; the connection is never closed from here.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use metrics::{counter, histogram};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, instrument, warn};

use crate::auth::TokenVerifier;
use crate::errors::{AuthError, DispatchError};
use crate::metrics::{
    AUTH_VERIFICATION_DURATION_SECONDS, AUTH_VERIFICATIONS_TOTAL, RPC_ERRORS_TOTAL,
    RPC_REQUESTS_TOTAL,
};
use crate::registry::{MethodHandler, MethodRegistry};
use crate::responder::Responder;
use crate::types::{Inbound, MethodField, Request};

/// How auth-gated requests are scheduled relative to later frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Verification and the handler run in a spawned task; later frames on
    /// the same connection are processed meanwhile.
    #[default]
    Concurrent,
    /// Verification is awaited before the next frame is read.
    Ordered,
}

impl DispatchMode {
    /// `Ordered` when `ordered` is set.
    pub fn from_ordered(ordered: bool) -> Self {
        if ordered { Self::Ordered } else { Self::Concurrent }
    }
}

/// What [`Dispatcher::on_message`] did with a frame.
#[derive(Debug)]
pub enum Dispatch {
    /// An error frame was sent; no handler ran.
    Rejected(DispatchError),
    /// The handler ran to completion (or verification failed in ordered mode).
    Handled,
    /// Verification is running in the background.
    Verifying(JoinHandle<()>),
}

/// Routes frames to registered handlers. Shared by every connection.
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    verifier: Option<Arc<dyn TokenVerifier>>,
    mode: DispatchMode,
}

impl Dispatcher {
    /// Create a dispatcher with no verifier in concurrent mode.
    pub fn new(registry: MethodRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            verifier: None,
            mode: DispatchMode::default(),
        }
    }

    /// Set the token verifier used for auth-gated methods.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Set the dispatch mode.
    #[must_use]
    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// The method registry.
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// The dispatch mode.
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Whether a token verifier is configured.
    pub fn has_verifier(&self) -> bool {
        self.verifier.is_some()
    }

    /// Reject a frame whose payload could not be read as text.
    pub fn on_unreadable(&self, responder: &Responder) -> Dispatch {
        reject(responder, None, DispatchError::NoMethod)
    }

    /// Handle one inbound frame from the connection behind `responder`.
    #[instrument(skip_all, fields(conn_id = %responder.connection_id(), method = tracing::field::Empty))]
    pub async fn on_message(&self, raw: &str, responder: &Responder) -> Dispatch {
        let mut inbound = match Inbound::parse(raw) {
            Ok(inbound) => inbound,
            Err(e) => {
                debug!(error = %e, "unparsable frame");
                return reject(responder, None, DispatchError::NoMethod);
            }
        };

        let method = match inbound.method.take() {
            Some(MethodField::Name(name)) => name,
            Some(MethodField::Other(text)) => {
                return reject(
                    responder,
                    inbound.id.as_ref(),
                    DispatchError::MethodNotFound(text),
                );
            }
            None => return reject(responder, inbound.id.as_ref(), DispatchError::NoMethod),
        };
        let _ = tracing::Span::current().record("method", method.as_str());

        let Some(descriptor) = self.registry.get(&method) else {
            return reject(
                responder,
                inbound.id.as_ref(),
                DispatchError::MethodNotFound(method),
            );
        };
        counter!(RPC_REQUESTS_TOTAL, "method" => method.clone()).increment(1);

        let handler = descriptor.handler().clone();
        let requires_auth = descriptor.requires_auth();
        let request = Request::from_inbound(method, inbound, responder.clone());

        if !requires_auth {
            invoke(handler, request).await;
            return Dispatch::Handled;
        }

        if request.authorization.is_none() {
            return reject(
                responder,
                request.id.as_ref(),
                DispatchError::AuthorizationRequired,
            );
        }

        let verifier = self.verifier.clone();
        match self.mode {
            DispatchMode::Ordered => {
                authorize_and_handle(verifier, handler, request).await;
                Dispatch::Handled
            }
            DispatchMode::Concurrent => Dispatch::Verifying(tokio::spawn(
                authorize_and_handle(verifier, handler, request).in_current_span(),
            )),
        }
    }
}

fn reject(responder: &Responder, id: Option<&Value>, err: DispatchError) -> Dispatch {
    counter!(RPC_ERRORS_TOTAL, "error_type" => err.error_type()).increment(1);
    debug!(error = %err, "request rejected");
    let _ = responder.send_error_frame(id, &err.to_string());
    Dispatch::Rejected(err)
}

async fn authorize_and_handle(
    verifier: Option<Arc<dyn TokenVerifier>>,
    handler: Arc<dyn MethodHandler>,
    mut request: Request,
) {
    let start = Instant::now();
    let result = match (&verifier, request.authorization.as_deref()) {
        (Some(verifier), Some(token)) => verifier.verify(token).await,
        (None, _) => Err(AuthError::NotConfigured),
        (_, None) => Err(AuthError::Invalid("missing token".into())),
    };
    histogram!(AUTH_VERIFICATION_DURATION_SECONDS).record(start.elapsed().as_secs_f64());

    match result {
        Ok(claims) => {
            counter!(AUTH_VERIFICATIONS_TOTAL, "outcome" => "success").increment(1);
            request.token = Some(claims);
            invoke(handler, request).await;
        }
        Err(err) => {
            counter!(AUTH_VERIFICATIONS_TOTAL, "outcome" => err.outcome()).increment(1);
            counter!(RPC_ERRORS_TOTAL, "error_type" => DispatchError::AuthorizationRequired.error_type())
                .increment(1);
            if matches!(err, AuthError::NotConfigured) {
                warn!(method = %request.method, "auth-gated method called but no verification key is configured");
            } else {
                debug!(method = %request.method, error = %err, "token verification failed");
            }
            let _ = request.reply_error(&DispatchError::AuthorizationRequired.to_string());
        }
    }
}

/// Run a handler, turning a panic into an error frame.
async fn invoke(handler: Arc<dyn MethodHandler>, request: Request) {
    let method = request.method.clone();
    let responder = request.responder().clone();

    if AssertUnwindSafe(handler.handle(request))
        .catch_unwind()
        .await
        .is_err()
    {
        counter!(RPC_ERRORS_TOTAL, "error_type" => "handler_panic").increment(1);
        error!(method, conn_id = %responder.connection_id(), "method handler panicked");
        let _ = responder.send_error_frame(None, &DispatchError::NoMethod.to_string());
    }
}
