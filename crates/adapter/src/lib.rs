//! Framework-agnostic request handling for the admin panel.
//!
//! Every HTTP library the admin panel can run under is reached through one contract,
//! [`WebFramework`]. Business logic never sees a native request type: each request is
//! translated into a canonical [`Context`] and driven through an explicit handler chain.
//!
//! # Architecture
//!
//! - [`Context`]: per-request state (request data, response buffer, handler cursor)
//! - [`WebFramework`]: the capabilities the rest of the system needs from the active HTTP library
//! - [`BaseAdapter`]: the library-independent parts (user lookup, plugin wiring, page rendering)
//! - [`binding`]: the generic [`Adapter`] plus one small [`NativeBinding`] per HTTP library
//! - [`render`]: the page-render pipeline shared by every adapter
//!
//! # Example
//!
//! ```no_run
//! use admin_adapter::binding::{Adapter, MemoryApp, MemoryBinding};
//! use admin_adapter::{WebFramework, chain, handler_fn};
//! use bytes::Bytes;
//! use http::{Method, Request};
//!
//! let mut adapter = Adapter::<MemoryBinding>::new();
//! adapter.set_app(MemoryApp::new());
//! adapter
//!     .add_handler(
//!         Method::GET,
//!         "/users/:id",
//!         chain([handler_fn(|ctx| {
//!             let id = ctx.query("id").unwrap_or_default().to_string();
//!             ctx.write(id.as_bytes());
//!         })]),
//!     )
//!     .unwrap();
//!
//! let app = adapter.take_app().unwrap();
//! let response = app.dispatch(Request::get("/users/42").body(Bytes::new()).unwrap());
//! assert_eq!(response.body().as_ref(), b"42");
//! ```

mod base;
mod config;
mod context;
mod error;
mod framework;
mod handler;
mod plugin;
mod service;

pub mod binding;
pub mod render;

#[cfg(test)]
mod testing;

pub use base::{BaseAdapter, DEFAULT_CONTENT_TYPE, DEFAULT_COOKIE_KEY};
pub use binding::{Adapter, NativeBinding};
pub use config::{Config, RenderFailure};
pub use context::{Context, LANG_PARAM, PJAX_HEADER, Response, Values};
pub use error::{AdapterError, ConfigError, DbError, PanelError, PluginError, TemplateError};
pub use framework::{NodeProcessor, PanelFn, RequestView, WebFramework};
pub use handler::{Handler, HandlerChain, Route, chain, handler_fn, join_path};
pub use plugin::{Middleware, Plugin, RoutePlugin};
pub use service::{
    Authenticator, Connection, EmptyMenu, Menu, MenuItem, MenuProvider, NavButton, PageData, Panel, PermissionChecker,
    Services, ServicesBuilder, Theme, UserModel,
};
