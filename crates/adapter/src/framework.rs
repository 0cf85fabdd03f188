//! The contract every HTTP library adapter satisfies.

use crate::context::{Context, Values};
use crate::error::{AdapterError, PanelError};
use crate::handler::HandlerChain;
use crate::plugin::Plugin;
use crate::service::{NavButton, Panel, Services, UserModel};
use http::{Method, StatusCode};
use std::sync::Arc;

/// Produces the panel of a page from the request it is rendered for.
pub type PanelFn = dyn Fn(&dyn RequestView) -> Result<Panel, PanelError> + Send + Sync;

/// Adjusts the navigation buttons of one page before it is rendered.
pub type NodeProcessor = dyn Fn(&mut [NavButton]) + Send + Sync;

/// Request accessors and response mutators over a single request.
///
/// Implemented by the canonical [`Context`] and by every adapter's request-scoped view, so the
/// page-render pipeline is written once. Accessors are pure reads. Each mutator writes straight
/// to the underlying response; calling [`write`](RequestView::write) twice appends, and avoiding
/// that is the caller's responsibility, as with any native response writer.
pub trait RequestView {
    fn path(&self) -> &str;

    fn method(&self) -> &Method;

    fn query(&self, key: &str) -> Option<&str>;

    fn form(&self) -> &Values;

    fn form_param(&self, key: &str) -> Option<&str>;

    /// The named cookie; `None` when absent or unreadable.
    fn cookie(&self, name: &str) -> Option<&str>;

    fn lang(&self) -> Option<&str>;

    fn is_pjax(&self) -> bool;

    fn wants_json(&self) -> bool;

    fn set_status(&mut self, status: StatusCode);

    fn set_content_type(&mut self, content_type: &str);

    fn write(&mut self, body: &[u8]);

    fn redirect(&mut self, location: &str);
}

/// Everything the rest of the admin panel may ask of the active HTTP library.
///
/// The native app and exchange types are associated types, so handing an adapter the wrong
/// native object is a compile error rather than a runtime failure.
pub trait WebFramework: Send + Sync + 'static {
    /// The native router or engine handle routes are registered on.
    type App: Send + 'static;

    /// One native request/response pair.
    type Exchange: Send;

    /// An adapter view scoped to one native exchange.
    type Scoped<'r>: RequestView
    where
        Self: 'r;

    /// Stable identifier, used for logging.
    fn name(&self) -> &'static str;

    fn set_services(&mut self, services: Arc<Services>);

    /// Binds the native app handle.
    fn set_app(&mut self, app: Self::App);

    /// Hands the native app back, typically once every route is registered.
    fn take_app(&mut self) -> Option<Self::App>;

    /// Binds `app` and registers every route of every plugin on it.
    fn use_plugins(&mut self, app: Self::App, plugins: &[Box<dyn Plugin>]) -> Result<(), AdapterError>;

    /// Registers one route. `path` uses the canonical syntax; path parameters reach handlers
    /// through [`Context::query`].
    fn add_handler(&mut self, method: Method, path: &str, handlers: HandlerChain) -> Result<(), AdapterError>;

    fn set_context<'r>(&'r self, exchange: &'r mut Self::Exchange) -> Self::Scoped<'r>;

    /// Resolves the user of a native request from its session cookie.
    fn user(&self, exchange: &mut Self::Exchange) -> Option<UserModel>;

    /// Renders a full admin page into a native response.
    fn content(
        &self,
        exchange: &mut Self::Exchange,
        panel_fn: &PanelFn,
        node_processor: Option<&NodeProcessor>,
        nav_buttons: &[NavButton],
    );
}

impl RequestView for Context {
    fn path(&self) -> &str {
        Context::path(self)
    }

    fn method(&self) -> &Method {
        Context::method(self)
    }

    fn query(&self, key: &str) -> Option<&str> {
        Context::query(self, key)
    }

    fn form(&self) -> &Values {
        Context::form(self)
    }

    fn form_param(&self, key: &str) -> Option<&str> {
        Context::form_param(self, key)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        Context::cookie(self, name)
    }

    fn lang(&self) -> Option<&str> {
        Context::lang(self)
    }

    fn is_pjax(&self) -> bool {
        Context::is_pjax(self)
    }

    fn wants_json(&self) -> bool {
        Context::wants_json(self)
    }

    fn set_status(&mut self, status: StatusCode) {
        Context::set_status(self, status);
    }

    fn set_content_type(&mut self, content_type: &str) {
        Context::set_content_type(self, content_type);
    }

    fn write(&mut self, body: &[u8]) {
        Context::write(self, body);
    }

    fn redirect(&mut self, location: &str) {
        Context::redirect(self, location);
    }
}
