//! The admin panel engine.
//!
//! [`Engine`] collects plugins and page routes, wraps every route in the middleware
//! [`Pipeline`] (panic recovery, maintenance mode, authentication, operation log) and
//! registers them through whichever [`WebFramework`](admin_adapter::WebFramework) adapter it
//! was built with.
//!
//! # Example
//!
//! ```no_run
//! use admin_adapter::binding::{Adapter, MemoryApp, MemoryBinding};
//! use admin_adapter::{Panel, RequestView, Services};
//! use admin_engine::Engine;
//! use http::Method;
//!
//! fn run(services: Services) -> Result<(), admin_engine::EngineError> {
//!     let mut engine = Engine::builder().services(services).adapter(Adapter::<MemoryBinding>::new()).build()?;
//!     engine.html(Method::GET, "/dashboard", |_view: &dyn RequestView| Ok(Panel::new("Dashboard", "<p>hello</p>")));
//!
//!     let app = engine.use_app(MemoryApp::new())?;
//!     assert_eq!(engine.registry().name(), Some("memory"));
//!     # drop(app);
//!     Ok(())
//! }
//! ```

mod audit;
mod engine;
mod error;
mod pipeline;
mod recover;
mod registry;

pub mod logging;

pub use audit::{OperationLog, record};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, RegistryError};
pub use pipeline::Pipeline;
pub use recover::{PanicReport, guard};
pub use registry::AdapterRegistry;
