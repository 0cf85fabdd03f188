use crate::Context;
use http::Method;
use std::fmt;
use std::sync::Arc;

/// One step of a handler chain.
///
/// A handler either calls [`Context::next`] to run the rest of the chain nested inside itself,
/// returns and lets the chain continue, or calls [`Context::abort`] to short-circuit it.
pub type Handler = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// An ordered, immutable sequence of handlers shared by every request hitting a route.
pub type HandlerChain = Arc<[Handler]>;

/// Wraps a closure as a [`Handler`].
pub fn handler_fn<F>(f: F) -> Handler
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Collects handlers into a [`HandlerChain`], preserving order.
pub fn chain<I>(handlers: I) -> HandlerChain
where
    I: IntoIterator<Item = Handler>,
{
    handlers.into_iter().collect()
}

/// Joins a url prefix and a route path into an absolute path.
///
/// ```
/// use admin_adapter::join_path;
///
/// assert_eq!(join_path("admin", "/info/:id"), "/admin/info/:id");
/// assert_eq!(join_path("/admin/", "/"), "/admin");
/// assert_eq!(join_path("", "users"), "/users");
/// ```
pub fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => format!("/{path}"),
        (false, true) => format!("/{prefix}"),
        (false, false) => format!("/{prefix}/{path}"),
    }
}

/// A registered route: method, canonical path pattern and handler chain.
///
/// Paths use the canonical syntax, `:name` for one segment and `*name` for the remainder.
#[derive(Clone)]
pub struct Route {
    method: Method,
    path: String,
    handlers: HandlerChain,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, handlers: HandlerChain) -> Self {
        Self { method, path: path.into(), handlers }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns a shared handle to the chain; cloning it never copies the handlers.
    pub fn handlers(&self) -> HandlerChain {
        Arc::clone(&self.handlers)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
