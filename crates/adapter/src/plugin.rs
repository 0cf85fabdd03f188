use crate::error::PluginError;
use crate::handler::{Handler, HandlerChain, Route};
use http::Method;
use std::fmt;
use std::mem;

/// The middleware chains a plugin can wrap its handlers in.
pub trait Middleware: Send + Sync {
    /// Panic recovery and maintenance short-circuit, no authentication.
    fn wrap(&self, handler: Handler) -> HandlerChain;

    /// Panic recovery, maintenance short-circuit and authentication.
    fn wrap_with_auth(&self, handler: Handler) -> HandlerChain;
}

/// A named bundle of routes mounted under a url prefix.
///
/// Plugins are initialised once at startup and never change after their routes are registered.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Url prefix the routes are mounted under; empty mounts them at the root.
    fn prefix(&self) -> &str {
        ""
    }

    fn init(&mut self, _middleware: &dyn Middleware) -> Result<(), PluginError> {
        Ok(())
    }

    fn routes(&self) -> &[Route];
}

enum Access {
    Public,
    Protected,
}

struct PendingRoute {
    method: Method,
    path: String,
    handler: Handler,
    access: Access,
}

/// A plugin assembled from handlers, wrapped in middleware when initialised.
///
/// ```
/// use admin_adapter::{RoutePlugin, Plugin, handler_fn};
/// use http::Method;
///
/// let plugin = RoutePlugin::new("example", "example")
///     .route(Method::GET, "/dashboard", handler_fn(|ctx| ctx.write(b"dashboard")))
///     .public_route(Method::GET, "/ping", handler_fn(|ctx| ctx.write(b"pong")));
///
/// assert_eq!(plugin.name(), "example");
/// // handlers become routes once `init` has wrapped them
/// assert!(plugin.routes().is_empty());
/// ```
pub struct RoutePlugin {
    name: String,
    prefix: String,
    pending: Vec<PendingRoute>,
    routes: Vec<Route>,
}

impl RoutePlugin {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self { name: name.into(), prefix: prefix.into(), pending: Vec::new(), routes: Vec::new() }
    }

    /// Adds a route behind the authentication middleware.
    pub fn route(mut self, method: Method, path: impl Into<String>, handler: Handler) -> Self {
        self.pending.push(PendingRoute { method, path: path.into(), handler, access: Access::Protected });
        self
    }

    /// Adds a route reachable without a session.
    pub fn public_route(mut self, method: Method, path: impl Into<String>, handler: Handler) -> Self {
        self.pending.push(PendingRoute { method, path: path.into(), handler, access: Access::Public });
        self
    }

    /// Adds a route with a chain used exactly as given.
    pub fn raw_route(mut self, method: Method, path: impl Into<String>, handlers: HandlerChain) -> Self {
        self.routes.push(Route::new(method, path, handlers));
        self
    }
}

impl Plugin for RoutePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn init(&mut self, middleware: &dyn Middleware) -> Result<(), PluginError> {
        for pending in mem::take(&mut self.pending) {
            let handlers = match pending.access {
                Access::Public => middleware.wrap(pending.handler),
                Access::Protected => middleware.wrap_with_auth(pending.handler),
            };
            self.routes.push(Route::new(pending.method, pending.path, handlers));
        }
        Ok(())
    }

    fn routes(&self) -> &[Route] {
        &self.routes
    }
}

impl fmt::Debug for RoutePlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutePlugin")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("pending", &self.pending.len())
            .field("routes", &self.routes)
            .finish()
    }
}
