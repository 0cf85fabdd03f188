//! Bindings of the adapter contract to concrete HTTP libraries.
//!
//! [`Adapter`] implements [`WebFramework`] once for every library. What differs between
//! libraries is captured by a small [`NativeBinding`]: how a canonical path is spelled in the
//! library's router, how a route is registered, and how a native exchange is read and written.

mod hyper_binding;
mod memory;

pub use hyper_binding::{DEFAULT_BODY_LIMIT, HyperApp, HyperBinding, HyperExchange, HyperService};
pub use memory::{MemoryApp, MemoryBinding, MemoryExchange};

use crate::base::BaseAdapter;
use crate::context::{self, Context, LANG_PARAM, Response, Values};
use crate::error::AdapterError;
use crate::framework::{NodeProcessor, PanelFn, RequestView, WebFramework};
use crate::handler::HandlerChain;
use crate::plugin::Plugin;
use crate::service::{NavButton, Services, UserModel};
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// The native callback a route is registered with.
pub type Endpoint<X> = Arc<dyn Fn(&mut X) + Send + Sync>;

/// How one HTTP library registers routes and exposes a request/response pair.
pub trait NativeBinding: Send + Sync + 'static {
    type App: Send + Sync + 'static;
    type Exchange: Send + 'static;

    const NAME: &'static str;

    /// Spells a canonical path pattern in the library's own route syntax.
    fn native_path(path: &str) -> Result<String, AdapterError>;

    fn register(
        app: &mut Self::App,
        method: Method,
        path: String,
        endpoint: Endpoint<Self::Exchange>,
    ) -> Result<(), AdapterError>;

    fn method(exchange: &Self::Exchange) -> &Method;

    fn uri(exchange: &Self::Exchange) -> &Uri;

    fn headers(exchange: &Self::Exchange) -> &HeaderMap;

    fn body(exchange: &Self::Exchange) -> Bytes;

    /// Path parameters captured by the library's router, percent-decoded, in declaration order.
    fn params(exchange: &Self::Exchange) -> &[(String, String)];

    fn remote_addr(exchange: &Self::Exchange) -> Option<SocketAddr>;

    fn set_status(exchange: &mut Self::Exchange, status: StatusCode);

    /// Sets a response header, replacing any value it already has.
    fn insert_header(exchange: &mut Self::Exchange, name: HeaderName, value: HeaderValue);

    /// Adds a response header value, keeping the values already there.
    fn append_header(exchange: &mut Self::Exchange, name: HeaderName, value: HeaderValue);

    fn write_body(exchange: &mut Self::Exchange, bytes: &[u8]);

    /// Copies a finished canonical response onto the native exchange.
    fn send(exchange: &mut Self::Exchange, response: Response) {
        let (status, headers, body) = response.into_parts();
        Self::set_status(exchange, status);
        let mut last_name = None;
        for (name, value) in headers {
            // `HeaderMap::into_iter` yields the name only for the first value of each header
            if let Some(name) = name {
                last_name = Some(name);
            }
            if let Some(name) = &last_name {
                Self::append_header(exchange, name.clone(), value);
            }
        }
        Self::write_body(exchange, &body);
    }
}

/// A segment of a canonical path pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
    CatchAll(&'a str),
}

/// Splits a canonical path pattern (`/users/:id`, `/assets/*file`) into segments.
pub(crate) fn parse_path(path: &str) -> Result<Vec<Segment<'_>>, AdapterError> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(AdapterError::invalid_path(path, "path must start with '/'"));
    };

    let raw = rest.split('/').collect::<Vec<_>>();
    let mut segments = Vec::with_capacity(raw.len());
    for (i, segment) in raw.iter().enumerate() {
        let parsed = if let Some(name) = segment.strip_prefix(':') {
            Segment::Param(param_name(path, name)?)
        } else if let Some(name) = segment.strip_prefix('*') {
            if i + 1 != raw.len() {
                return Err(AdapterError::invalid_path(path, "catch-all parameter must be the last segment"));
            }
            Segment::CatchAll(param_name(path, name)?)
        } else {
            Segment::Static(segment)
        };
        segments.push(parsed);
    }
    Ok(segments)
}

fn param_name<'a>(path: &str, name: &'a str) -> Result<&'a str, AdapterError> {
    if name.is_empty() {
        return Err(AdapterError::invalid_path(path, "parameter name must not be empty"));
    }
    if name.contains([':', '*', '{', '}']) {
        return Err(AdapterError::invalid_path(path, format!("invalid parameter name '{name}'")));
    }
    Ok(name)
}

/// Percent-decodes a captured path parameter, the way query values are decoded.
///
/// A value that does not decode to UTF-8 is kept as sent.
pub(crate) fn decode_param(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), Cow::into_owned)
}

/// Builds the canonical context of a native exchange, with path parameters merged into the
/// query values.
pub fn context_from<B: NativeBinding>(exchange: &B::Exchange) -> Context {
    let mut ctx = Context::new(
        B::method(exchange).clone(),
        B::uri(exchange).clone(),
        B::headers(exchange).clone(),
        B::body(exchange),
    )
    .with_remote_addr(B::remote_addr(exchange));
    ctx.add_path_params(B::params(exchange).iter().map(|(key, value)| (key.as_str(), value.as_str())));
    ctx
}

/// The adapter for the HTTP library described by `B`.
pub struct Adapter<B: NativeBinding> {
    base: BaseAdapter,
    app: Option<B::App>,
}

impl<B: NativeBinding> Adapter<B> {
    /// An adapter with no services and no native app bound yet.
    pub fn new() -> Self {
        Self { base: BaseAdapter::new(), app: None }
    }

    /// The library-independent half shared by every adapter.
    pub fn base(&self) -> &BaseAdapter {
        &self.base
    }

    /// The bound native app, for registering routes outside the admin panel.
    pub fn app_mut(&mut self) -> Option<&mut B::App> {
        self.app.as_mut()
    }
}

impl<B: NativeBinding> Default for Adapter<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: NativeBinding> fmt::Debug for Adapter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("name", &B::NAME)
            .field("base", &self.base)
            .field("app_bound", &self.app.is_some())
            .finish()
    }
}

impl<B: NativeBinding> WebFramework for Adapter<B> {
    type App = B::App;
    type Exchange = B::Exchange;
    type Scoped<'r>
        = ScopedView<'r, B>
    where
        Self: 'r;

    fn name(&self) -> &'static str {
        B::NAME
    }

    fn set_services(&mut self, services: Arc<Services>) {
        self.base.set_services(services);
    }

    fn set_app(&mut self, app: Self::App) {
        self.app = Some(app);
    }

    fn take_app(&mut self) -> Option<Self::App> {
        self.app.take()
    }

    fn use_plugins(&mut self, app: Self::App, plugins: &[Box<dyn Plugin>]) -> Result<(), AdapterError> {
        BaseAdapter::get_use(app, plugins, self)
    }

    fn add_handler(&mut self, method: Method, path: &str, handlers: HandlerChain) -> Result<(), AdapterError> {
        let native_path = B::native_path(path)?;
        let app = self.app.as_mut().ok_or(AdapterError::AppNotBound)?;

        let endpoint: Endpoint<B::Exchange> = Arc::new(move |exchange: &mut B::Exchange| {
            let mut ctx = context_from::<B>(exchange).with_handlers(Arc::clone(&handlers));
            ctx.next();
            B::send(exchange, ctx.into_response());
        });
        B::register(app, method, native_path, endpoint)
    }

    fn set_context<'r>(&'r self, exchange: &'r mut Self::Exchange) -> Self::Scoped<'r> {
        ScopedView::new(exchange)
    }

    fn user(&self, exchange: &mut Self::Exchange) -> Option<UserModel> {
        self.base.get_user(exchange, self)
    }

    fn content(
        &self,
        exchange: &mut Self::Exchange,
        panel_fn: &PanelFn,
        node_processor: Option<&NodeProcessor>,
        nav_buttons: &[NavButton],
    ) {
        self.base.get_content(exchange, panel_fn, self, nav_buttons, node_processor);
    }
}

/// An adapter view over one native exchange.
///
/// Reads go to the native request, writes straight to the native response.
pub struct ScopedView<'r, B: NativeBinding> {
    exchange: &'r mut B::Exchange,
    query: Values,
    form: Values,
    cookies: HashMap<String, String>,
    _binding: PhantomData<B>,
}

impl<'r, B: NativeBinding> ScopedView<'r, B> {
    fn new(exchange: &'r mut B::Exchange) -> Self {
        let mut query = B::uri(exchange).query().map(context::parse_values).unwrap_or_default();
        for (key, value) in B::params(exchange) {
            query.insert(key.clone(), vec![value.clone()]);
        }
        let form = context::parse_form(B::headers(exchange), &B::body(exchange));
        let cookies = context::parse_cookies(B::headers(exchange));
        Self { exchange, query, form, cookies, _binding: PhantomData }
    }

    /// The native exchange, for what the canonical view does not cover.
    pub fn exchange(&mut self) -> &mut B::Exchange {
        &mut *self.exchange
    }

    fn native(&self) -> &B::Exchange {
        &*self.exchange
    }

    fn set_header(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => B::insert_header(self.exchange, name, value),
            Err(e) => warn!(header = %name, cause = %e, "ignore invalid response header value"),
        }
    }
}

impl<B: NativeBinding> RequestView for ScopedView<'_, B> {
    fn path(&self) -> &str {
        B::uri(self.native()).path()
    }

    fn method(&self) -> &Method {
        B::method(self.native())
    }

    fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).and_then(|values| values.first()).map(String::as_str)
    }

    fn form(&self) -> &Values {
        &self.form
    }

    fn form_param(&self, key: &str) -> Option<&str> {
        self.form.get(key).and_then(|values| values.first()).map(String::as_str)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    fn lang(&self) -> Option<&str> {
        self.query(LANG_PARAM).filter(|lang| !lang.is_empty())
    }

    fn is_pjax(&self) -> bool {
        context::is_pjax(B::headers(self.native()))
    }

    fn wants_json(&self) -> bool {
        context::wants_json(B::headers(self.native()))
    }

    fn set_status(&mut self, status: StatusCode) {
        B::set_status(self.exchange, status);
    }

    fn set_content_type(&mut self, content_type: &str) {
        self.set_header(header::CONTENT_TYPE, content_type);
    }

    fn write(&mut self, body: &[u8]) {
        B::write_body(self.exchange, body);
    }

    fn redirect(&mut self, location: &str) {
        B::set_status(self.exchange, StatusCode::FOUND);
        self.set_header(header::LOCATION, location);
    }
}

impl<B: NativeBinding> fmt::Debug for ScopedView<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedView")
            .field("binding", &B::NAME)
            .field("path", &B::uri(self.native()).path())
            .finish_non_exhaustive()
    }
}
