use crate::error::EngineError;
use crate::pipeline::Pipeline;
use crate::registry::AdapterRegistry;
use admin_adapter::render;
use admin_adapter::{
    Config, Handler, NavButton, Panel, PanelError, PanelFn, Plugin, RequestView, Route, Services, UserModel,
    WebFramework, handler_fn,
};
use http::{Method, StatusCode};
use serde_json::json;
use std::fmt;
use std::mem;
use std::sync::Arc;
use tracing::{error, info};

/// The admin panel engine.
///
/// Owns the shared services, the plugins and the engine's own routes. [`use_app`](Self::use_app)
/// wraps every route in the middleware [`Pipeline`], registers it through the adapter and
/// installs the adapter as the active one.
pub struct Engine<W: WebFramework> {
    services: Arc<Services>,
    nav_buttons: Arc<[NavButton]>,
    pipeline: Pipeline,
    adapter: Option<W>,
    plugins: Vec<Box<dyn Plugin>>,
    routes: Vec<Route>,
    registry: AdapterRegistry<W>,
}

/// The routes registered on the engine itself, mounted under the configured url prefix.
struct EngineRoutes {
    prefix: String,
    routes: Vec<Route>,
}

impl Plugin for EngineRoutes {
    fn name(&self) -> &str {
        "engine"
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn routes(&self) -> &[Route] {
        &self.routes
    }
}

impl<W: WebFramework> Engine<W> {
    pub fn builder() -> EngineBuilder<W> {
        EngineBuilder::new()
    }

    fn new(services: Arc<Services>, mut adapter: W, plugins: Vec<Box<dyn Plugin>>, nav_buttons: Vec<NavButton>) -> Self {
        let nav_buttons: Arc<[NavButton]> = nav_buttons.into();
        adapter.set_services(Arc::clone(&services));
        let pipeline = Pipeline::new(Arc::clone(&services), Arc::clone(&nav_buttons));
        let health = Route::new(Method::GET, "/health", pipeline.wrap(health_handler()));

        Self {
            services,
            nav_buttons,
            pipeline,
            adapter: Some(adapter),
            plugins,
            routes: vec![health],
            registry: AdapterRegistry::new(),
        }
    }

    pub fn config(&self) -> &Config {
        self.services.config()
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn registry(&self) -> &AdapterRegistry<W> {
        &self.registry
    }

    /// The active adapter once started, the pending one before.
    pub fn adapter(&self) -> Option<&W> {
        self.registry.get().or(self.adapter.as_ref())
    }

    pub fn add_plugin(&mut self, plugin: impl Plugin + 'static) -> &mut Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Registers a protected admin page rendered around the panel `panel_fn` produces.
    pub fn html<F>(&mut self, method: Method, path: &str, panel_fn: F) -> &mut Self
    where
        F: Fn(&dyn RequestView) -> Result<Panel, PanelError> + Send + Sync + 'static,
    {
        let handlers = self.pipeline.wrap_with_auth(self.page_handler(Arc::new(panel_fn)));
        self.routes.push(Route::new(method, path, handlers));
        self
    }

    /// Registers an admin page reachable without a session.
    pub fn html_public<F>(&mut self, method: Method, path: &str, panel_fn: F) -> &mut Self
    where
        F: Fn(&dyn RequestView) -> Result<Panel, PanelError> + Send + Sync + 'static,
    {
        let handlers = self.pipeline.wrap(self.page_handler(Arc::new(panel_fn)));
        self.routes.push(Route::new(method, path, handlers));
        self
    }

    /// Registers a protected route answered by `handler` directly.
    pub fn data(&mut self, method: Method, path: &str, handler: Handler) -> &mut Self {
        let handlers = self.pipeline.wrap_with_auth(handler);
        self.routes.push(Route::new(method, path, handlers));
        self
    }

    /// Registers a route answered by `handler` directly, reachable without a session.
    pub fn data_public(&mut self, method: Method, path: &str, handler: Handler) -> &mut Self {
        let handlers = self.pipeline.wrap(handler);
        self.routes.push(Route::new(method, path, handlers));
        self
    }

    fn page_handler(&self, panel_fn: Arc<PanelFn>) -> Handler {
        let services = Arc::clone(&self.services);
        let nav_buttons = Arc::clone(&self.nav_buttons);
        handler_fn(move |ctx| {
            let user = ctx.user().cloned().unwrap_or_default();
            render::render_for_user(ctx, &services, &user, true, panel_fn.as_ref(), None, &nav_buttons);
        })
    }

    /// Initialises every plugin, registers all routes on `app` and installs the adapter.
    ///
    /// Hands the native app back with every route registered, ready to be served. Can only
    /// succeed once.
    pub fn use_app(&mut self, app: W::App) -> Result<W::App, EngineError> {
        let mut adapter = self.adapter.take().ok_or(EngineError::AlreadyStarted)?;

        let mut plugins: Vec<Box<dyn Plugin>> = Vec::with_capacity(self.plugins.len() + 1);
        plugins.push(Box::new(EngineRoutes {
            prefix: self.services.config().url_prefix.clone(),
            routes: mem::take(&mut self.routes),
        }));
        plugins.append(&mut self.plugins);

        for plugin in &mut plugins {
            plugin
                .init(&self.pipeline)
                .map_err(|source| EngineError::Plugin { name: plugin.name().to_string(), source })?;
        }

        adapter.use_plugins(app, &plugins)?;
        let app = adapter.take_app().ok_or(EngineError::AppMissing)?;
        let routes = plugins.iter().map(|plugin| plugin.routes().len()).sum::<usize>();
        self.plugins = plugins;

        let adapter = self.registry.install(adapter)?;
        info!(adapter = adapter.name(), plugins = self.plugins.len(), routes, "engine started");
        Ok(app)
    }

    /// Renders a full admin page into a native response, for native handlers outside the
    /// engine's routes.
    pub fn content(&self, exchange: &mut W::Exchange, panel_fn: &PanelFn) {
        match self.adapter() {
            Some(adapter) => adapter.content(exchange, panel_fn, None, &self.nav_buttons),
            None => error!("render content without adapter"),
        }
    }

    /// The session user of a native request.
    pub fn user(&self, exchange: &mut W::Exchange) -> Option<UserModel> {
        self.adapter().and_then(|adapter| adapter.user(exchange))
    }
}

fn health_handler() -> Handler {
    handler_fn(|ctx| {
        if ctx.wants_json() {
            ctx.json(StatusCode::OK, &json!({"status": "ok"}));
        } else {
            ctx.set_content_type(mime::TEXT_PLAIN_UTF_8.as_ref());
            ctx.write(b"ok");
        }
    })
}

impl<W: WebFramework> fmt::Debug for Engine<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("services", &self.services)
            .field("plugins", &self.plugins.iter().map(|plugin| plugin.name()).collect::<Vec<_>>())
            .field("routes", &self.routes)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

pub struct EngineBuilder<W: WebFramework> {
    config: Option<Config>,
    services: Option<Services>,
    adapter: Option<W>,
    plugins: Vec<Box<dyn Plugin>>,
    nav_buttons: Vec<NavButton>,
}

impl<W: WebFramework> EngineBuilder<W> {
    fn new() -> Self {
        Self { config: None, services: None, adapter: None, plugins: Vec::new(), nav_buttons: Vec::new() }
    }

    /// Overrides the config the services were built with.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn services(mut self, services: Services) -> Self {
        self.services = Some(services);
        self
    }

    pub fn adapter(mut self, adapter: W) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn nav_button(mut self, button: NavButton) -> Self {
        self.nav_buttons.push(button);
        self
    }

    pub fn build(self) -> Result<Engine<W>, EngineError> {
        let mut services = self.services.ok_or(EngineError::Missing { name: "services" })?;
        if let Some(config) = self.config {
            services = services.with_config(config);
        }
        let adapter = self.adapter.ok_or(EngineError::Missing { name: "adapter" })?;
        Ok(Engine::new(Arc::new(services), adapter, self.plugins, self.nav_buttons))
    }
}

impl<W: WebFramework> fmt::Debug for EngineBuilder<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("services", &self.services)
            .field("adapter", &self.adapter.as_ref().map(WebFramework::name))
            .field("plugins", &self.plugins.len())
            .field("nav_buttons", &self.nav_buttons)
            .finish()
    }
}
