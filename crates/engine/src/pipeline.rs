//! The middleware chains every engine route is wrapped in.

use crate::audit;
use crate::recover::{self, PanicReport};
use admin_adapter::render;
use admin_adapter::{
    Connection, Context, Handler, HandlerChain, Middleware, NavButton, Panel, Services, chain, handler_fn,
};
use http::StatusCode;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

const MAINTENANCE_PAGE: &str = "<!DOCTYPE html><html><head><title>503</title></head>\
<body><h1>Service Unavailable</h1><p>The admin panel is under maintenance, please come back later.</p></body></html>";

const ERROR_PAGE: &str = "<!DOCTYPE html><html><head><title>500</title></head>\
<body><h1>500 Internal Server Error</h1></body></html>";

/// Builds the panic-recovery, maintenance and authentication layers around route handlers.
#[derive(Clone)]
pub struct Pipeline {
    services: Arc<Services>,
    nav_buttons: Arc<[NavButton]>,
}

impl Pipeline {
    pub fn new(services: Arc<Services>, nav_buttons: Arc<[NavButton]>) -> Self {
        Self { services, nav_buttons }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn nav_buttons(&self) -> &[NavButton] {
        &self.nav_buttons
    }

    /// Panic recovery and maintenance short-circuit in front of `handler`, for routes that need
    /// no session.
    pub fn wrap(&self, handler: Handler) -> HandlerChain {
        chain([self.defer_handler(self.services.conn_handle()), self.maintenance_handler(), handler])
    }

    /// [`wrap`](Self::wrap) plus the authentication middleware, for protected routes.
    pub fn wrap_with_auth(&self, handler: Handler) -> HandlerChain {
        chain([
            self.defer_handler(self.services.conn_handle()),
            self.maintenance_handler(),
            self.auth_handler(),
            handler,
        ])
    }

    /// The recovery layer: runs the rest of the chain, then writes the operation log.
    ///
    /// A panic anywhere after it is logged with its backtrace and answered with a `500` error
    /// panel, or a JSON error body when the client wants JSON; the chain is aborted and the
    /// operation log skipped. If the theme panics while rendering the error panel, a built-in
    /// error page is sent instead.
    pub fn defer_handler(&self, conn: Arc<dyn Connection>) -> Handler {
        let services = Arc::clone(&self.services);
        let nav_buttons = Arc::clone(&self.nav_buttons);
        handler_fn(move |ctx| match recover::guard(|| ctx.next()) {
            Ok(()) => audit::record(ctx, services.config(), conn.as_ref()),
            Err(report) => {
                error!(
                    method = %ctx.method(),
                    path = ctx.path(),
                    panic = %report.message,
                    backtrace = %report.backtrace,
                    "handler panicked"
                );
                ctx.abort();
                render_panic(ctx, &services, &nav_buttons, &report);
            }
        })
    }

    /// Answers `503` and stops the chain while the config is in maintenance mode.
    pub fn maintenance_handler(&self) -> Handler {
        let services = Arc::clone(&self.services);
        handler_fn(move |ctx| {
            if !services.config().maintenance {
                return;
            }
            debug!(path = ctx.path(), "maintenance mode, request rejected");
            if ctx.wants_json() {
                ctx.json(StatusCode::SERVICE_UNAVAILABLE, &json!({"code": 503, "msg": "service under maintenance"}));
            } else {
                ctx.html(StatusCode::SERVICE_UNAVAILABLE, MAINTENANCE_PAGE);
            }
            ctx.abort();
        })
    }

    /// Resolves the session user into the request extensions and checks permission.
    ///
    /// Without a user the request is redirected to the login page (`401` for JSON clients);
    /// without permission it gets the forbidden panel (`403` for JSON clients).
    pub fn auth_handler(&self) -> Handler {
        let services = Arc::clone(&self.services);
        let nav_buttons = Arc::clone(&self.nav_buttons);
        handler_fn(move |ctx| {
            let config = services.config();
            let user = ctx.cookie(&config.cookie_name).map(str::to_string).and_then(|cookie| {
                let conn = services.conn();
                let user = services.auth().resolve(&cookie, conn);
                conn.release();
                user
            });

            let Some(user) = user else {
                debug!(path = ctx.path(), "no valid session");
                if ctx.wants_json() {
                    ctx.json(StatusCode::UNAUTHORIZED, &json!({"code": 401, "msg": "unauthorized"}));
                } else {
                    ctx.redirect(&config.login_location());
                }
                ctx.abort();
                return;
            };

            if !services.permission().check(&user, ctx.path(), ctx.method(), ctx.form()) {
                debug!(path = ctx.path(), user = user.id, "permission denied");
                if ctx.wants_json() {
                    ctx.json(StatusCode::FORBIDDEN, &json!({"code": 403, "msg": "permission denied"}));
                } else {
                    render::render_panel(ctx, &services, &user, &Panel::forbidden(), StatusCode::FORBIDDEN, None, &nav_buttons);
                }
                ctx.abort();
                return;
            }

            ctx.set_user(user);
        })
    }
}

fn render_panic(ctx: &mut Context, services: &Services, nav_buttons: &[NavButton], report: &PanicReport) {
    ctx.response_mut().clear();
    let message = if services.config().debug { report.message.as_str() } else { "Internal Server Error" };

    if ctx.wants_json() {
        ctx.json(StatusCode::INTERNAL_SERVER_ERROR, &json!({"code": 500, "msg": message}));
        return;
    }

    let user = ctx.user().cloned().unwrap_or_default();
    let panel = Panel::error(message);
    let rendered = recover::guard(|| {
        render::render_panel(ctx, services, &user, &panel, StatusCode::INTERNAL_SERVER_ERROR, None, nav_buttons);
    });
    if let Err(report) = &rendered {
        error!(theme = services.theme().name(), panic = %report.message, "render error page panicked");
    }
    if rendered.is_err() || ctx.response().body().is_empty() {
        ctx.response_mut().clear();
        ctx.html(StatusCode::INTERNAL_SERVER_ERROR, ERROR_PAGE);
    }
}

impl Middleware for Pipeline {
    fn wrap(&self, handler: Handler) -> HandlerChain {
        Pipeline::wrap(self, handler)
    }

    fn wrap_with_auth(&self, handler: Handler) -> HandlerChain {
        Pipeline::wrap_with_auth(self, handler)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("services", &self.services).field("nav_buttons", &self.nav_buttons).finish()
    }
}
