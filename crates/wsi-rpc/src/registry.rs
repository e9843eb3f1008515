//! Method registry.
//!
//! Maps method names to a handler and a `requires_auth` flag. Handlers own
//! their reply: they send zero or more frames through the request.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::types::Request;

/// Trait implemented by every method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Handle one request. Reply via [`Request::reply`] or [`Request::reply_error`].
    async fn handle(&self, request: Request);
}

/// Adapter turning an async closure into a [`MethodHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` as a handler.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, request: Request) {
        (self.f)(request).await;
    }
}

/// A registered method.
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    handler: Arc<dyn MethodHandler>,
    requires_auth: bool,
}

impl MethodDescriptor {
    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handler.
    pub fn handler(&self) -> &Arc<dyn MethodHandler> {
        &self.handler
    }

    /// Whether a verified token is required before the handler runs.
    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("requires_auth", &self.requires_auth)
            .finish_non_exhaustive()
    }
}

/// Registry mapping method names to handlers.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, MethodDescriptor>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Re-registering a name replaces the previous entry.
    pub fn register(
        &mut self,
        name: &str,
        handler: impl MethodHandler + 'static,
        requires_auth: bool,
    ) {
        let descriptor = MethodDescriptor {
            name: name.to_owned(),
            handler: Arc::new(handler),
            requires_auth,
        };
        let _ = self.methods.insert(name.to_owned(), descriptor);
    }

    /// Register an async closure.
    pub fn register_fn<F, Fut>(&mut self, name: &str, f: F, requires_auth: bool)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(name, handler_fn(f), requires_auth);
    }

    /// Look up a method.
    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    /// All registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// The `requires_auth` flag of a registered method.
    pub fn requires_auth(&self, name: &str) -> Option<bool> {
        self.methods.get(name).map(MethodDescriptor::requires_auth)
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}
