use crate::error::AdapterError;
use crate::framework::{NodeProcessor, PanelFn, RequestView, WebFramework};
use crate::handler::join_path;
use crate::plugin::Plugin;
use crate::render;
use crate::service::{NavButton, Services, UserModel};
use http::StatusCode;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Cookie holding the session id when the config does not name one.
pub const DEFAULT_COOKIE_KEY: &str = "admin_cookie";

/// Content type of rendered admin pages when the config does not name one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// The library-independent half of every adapter.
///
/// Concrete adapters embed one and pass themselves in, so the logic below is written once
/// against [`WebFramework`] and never against a native type.
#[derive(Default, Clone)]
pub struct BaseAdapter {
    services: Option<Arc<Services>>,
}

impl BaseAdapter {
    /// A base without services; defaults apply until services are set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the collaborators used for users and page rendering.
    pub fn set_services(&mut self, services: Arc<Services>) {
        self.services = Some(services);
    }

    /// The bound collaborators, if any.
    pub fn services(&self) -> Option<&Arc<Services>> {
        self.services.as_ref()
    }

    /// Name of the session cookie.
    pub fn cookie_key(&self) -> &str {
        self.services.as_ref().map_or(DEFAULT_COOKIE_KEY, |services| services.config().cookie_name.as_str())
    }

    /// Content type of rendered pages.
    pub fn content_type(&self) -> &str {
        self.services.as_ref().map_or(DEFAULT_CONTENT_TYPE, |services| services.config().content_type.as_str())
    }

    /// Resolves the user of a native request from its session cookie.
    ///
    /// `None` when the cookie is missing, the session is unknown, or no services are bound.
    pub fn get_user<W: WebFramework>(&self, exchange: &mut W::Exchange, wf: &W) -> Option<UserModel> {
        let services = self.services.as_ref()?;
        let view = wf.set_context(exchange);
        let cookie = view.cookie(self.cookie_key())?;

        let conn = services.conn();
        let user = services.auth().resolve(cookie, conn);
        conn.release();

        if user.is_none() {
            debug!(adapter = wf.name(), "session cookie does not resolve to a user");
        }
        user
    }

    /// Binds `app` on `wf` and registers every route of every plugin on it.
    ///
    /// Routes are mounted under their plugin's prefix; the first registration failure aborts.
    pub fn get_use<W: WebFramework>(app: W::App, plugins: &[Box<dyn Plugin>], wf: &mut W) -> Result<(), AdapterError> {
        wf.set_app(app);
        for plugin in plugins {
            let prefix = plugin.prefix();
            for route in plugin.routes() {
                let path = if prefix.is_empty() { route.path().to_string() } else { join_path(prefix, route.path()) };
                wf.add_handler(route.method().clone(), &path, route.handlers())?;
                debug!(adapter = wf.name(), plugin = plugin.name(), method = %route.method(), path = %path, "route registered");
            }
            info!(adapter = wf.name(), plugin = plugin.name(), routes = plugin.routes().len(), "plugin mounted");
        }
        Ok(())
    }

    /// Renders a full admin page for a native request.
    pub fn get_content<W: WebFramework>(
        &self,
        exchange: &mut W::Exchange,
        panel_fn: &PanelFn,
        wf: &W,
        nav_buttons: &[NavButton],
        node_processor: Option<&NodeProcessor>,
    ) {
        let mut view = wf.set_context(exchange);
        match self.services.as_ref() {
            Some(services) => render::render_page(&mut view, services, panel_fn, node_processor, nav_buttons),
            None => {
                error!(adapter = wf.name(), "render page without services");
                view.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }
}

impl fmt::Debug for BaseAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseAdapter").field("services", &self.services).finish()
    }
}
