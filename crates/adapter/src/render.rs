//! The page-render pipeline shared by every adapter.
//!
//! A page request walks these states in order, and the first failing one decides the response:
//!
//! 1. no session cookie: redirect to the login page
//! 2. cookie does not resolve to a user: redirect to the login page
//! 3. permission check
//! 4. panel: the forbidden panel with `403` when not permitted, a warning panel with `200` when
//!    the panel function fails, the caller's panel otherwise
//! 5. template execution into a buffer, then one status, one content type and one body write

use crate::config::RenderFailure;
use crate::framework::{NodeProcessor, PanelFn, RequestView};
use crate::service::{NavButton, PageData, Panel, Services, UserModel};
use http::StatusCode;
use tracing::{debug, error, warn};

const FALLBACK_PAGE: &str = "<!DOCTYPE html><html><head><title>500</title></head>\
<body><h1>500 Internal Server Error</h1></body></html>";

/// Renders a full admin page for the request behind `view`.
pub fn render_page(
    view: &mut dyn RequestView,
    services: &Services,
    panel_fn: &PanelFn,
    node_processor: Option<&NodeProcessor>,
    nav_buttons: &[NavButton],
) {
    let config = services.config();

    let Some(cookie) = view.cookie(&config.cookie_name).map(str::to_string) else {
        debug!(path = view.path(), "no session cookie, redirect to login");
        view.redirect(&config.login_location());
        return;
    };

    let conn = services.conn();
    let user = services.auth().resolve(&cookie, conn);
    conn.release();
    let Some(user) = user else {
        debug!(path = view.path(), "session cookie does not resolve to a user, redirect to login");
        view.redirect(&config.login_location());
        return;
    };

    let permitted = services.permission().check(&user, view.path(), view.method(), view.form());
    render_for_user(view, services, &user, permitted, panel_fn, node_processor, nav_buttons);
}

/// Renders the page of an already authenticated user.
pub fn render_for_user(
    view: &mut dyn RequestView,
    services: &Services,
    user: &UserModel,
    permitted: bool,
    panel_fn: &PanelFn,
    node_processor: Option<&NodeProcessor>,
    nav_buttons: &[NavButton],
) {
    let (panel, status) = if permitted {
        match panel_fn(&*view) {
            Ok(panel) => (panel, StatusCode::OK),
            Err(e) => {
                warn!(path = view.path(), cause = %e, "panel function failed, render warning panel");
                (Panel::warning(&e.to_string()), StatusCode::OK)
            }
        }
    } else {
        debug!(path = view.path(), user = user.id, "permission denied");
        (Panel::forbidden(), StatusCode::FORBIDDEN)
    };

    render_panel(view, services, user, &panel, status, node_processor, nav_buttons);
}

/// Executes the page template around `panel` and writes the result.
pub fn render_panel(
    view: &mut dyn RequestView,
    services: &Services,
    user: &UserModel,
    panel: &Panel,
    status: StatusCode,
    node_processor: Option<&NodeProcessor>,
    nav_buttons: &[NavButton],
) {
    let config = services.config();
    let theme = services.theme();

    let mut buttons = nav_buttons.to_vec();
    if let Some(process) = node_processor {
        process(&mut buttons);
    }

    let menu = services.menu().menu(user, view.path());
    let is_pjax = view.is_pjax();
    let template = theme.template_name(is_pjax);
    let prefix = config.prefix();
    let lang = view.lang().unwrap_or(&config.language).to_string();

    let data = PageData {
        user,
        menu: &menu,
        panel,
        assets: &config.assets,
        buttons: &buttons,
        title: &config.title,
        url_prefix: &prefix,
        lang: &lang,
        is_pjax,
    };

    let mut out = Vec::new();
    match theme.execute(template, &data, &mut out) {
        Ok(()) => write_page(view, status, &config.content_type, &out),
        Err(e) => match config.render_failure {
            RenderFailure::Strict => {
                error!(theme = theme.name(), template, cause = %e, "execute template error, render fallback page");
                write_page(view, StatusCode::INTERNAL_SERVER_ERROR, &config.content_type, FALLBACK_PAGE.as_bytes());
            }
            RenderFailure::BestEffort => {
                error!(theme = theme.name(), template, cause = %e, "execute template error, send partial output");
                write_page(view, status, &config.content_type, &out);
            }
        },
    }
}

fn write_page(view: &mut dyn RequestView, status: StatusCode, content_type: &str, body: &[u8]) {
    view.set_status(status);
    view.set_content_type(content_type);
    view.write(body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::PanelError;
    use crate::testing;
    use crate::{Config, PJAX_HEADER};
    use bytes::Bytes;
    use http::header::{self, HeaderValue};
    use http::{HeaderMap, Method};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn context(cookie: Option<&'static str>, pjax: bool) -> Context {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            headers.insert(header::COOKIE, HeaderValue::from_static(cookie));
        }
        if pjax {
            headers.insert(PJAX_HEADER, HeaderValue::from_static("true"));
        }
        Context::new(Method::GET, "/admin/info/users".parse().unwrap(), headers, Bytes::new())
    }

    fn users_panel(_view: &dyn RequestView) -> Result<Panel, PanelError> {
        Ok(Panel::new("Users", "<table></table>"))
    }

    /// A panel function that records whether it was called.
    fn tracked_panel() -> (Arc<AtomicBool>, impl Fn(&dyn RequestView) -> Result<Panel, PanelError> + Send + Sync + 'static) {
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let panel = move |view: &dyn RequestView| {
            flag.store(true, Ordering::SeqCst);
            users_panel(view)
        };
        (called, panel)
    }

    fn body(ctx: &Context) -> String {
        String::from_utf8(ctx.response().body().to_vec()).unwrap()
    }

    #[test]
    fn missing_cookie_redirects_to_login() {
        let (services, _conn) = testing::services(true);
        let mut ctx = context(None, false);
        let (called, panel) = tracked_panel();

        render_page(&mut ctx, &services, &panel, None, &[]);

        assert_eq!(ctx.response().status(), StatusCode::FOUND);
        assert_eq!(ctx.response().headers()[header::LOCATION], "/admin/login");
        assert!(ctx.response().body().is_empty());
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn unknown_session_redirects_to_login() {
        let (services, _conn) = testing::services(true);
        let mut ctx = context(Some("admin_cookie=stale"), false);
        let (called, panel) = tracked_panel();

        render_page(&mut ctx, &services, &panel, None, &[]);

        assert_eq!(ctx.response().status(), StatusCode::FOUND);
        assert!(ctx.response().body().is_empty());
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn full_page_for_permitted_user() {
        let (services, _conn) = testing::services(true);
        let mut ctx = context(Some("admin_cookie=good"), false);

        render_page(&mut ctx, &services, &users_panel, None, &[]);

        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(ctx.response().headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(body(&ctx), "layout|admin|Users|<table></table>|");
    }

    #[test]
    fn pjax_request_selects_fragment_template() {
        let (services, _conn) = testing::services(true);
        let mut ctx = context(Some("admin_cookie=good"), true);

        render_page(&mut ctx, &services, &users_panel, None, &[]);

        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert!(body(&ctx).starts_with("pjax|"));
    }

    #[test]
    fn permission_denied_renders_forbidden_panel() {
        let (services, _conn) = testing::services(false);
        let mut ctx = context(Some("admin_cookie=good"), false);
        let (called, panel) = tracked_panel();

        render_page(&mut ctx, &services, &panel, None, &[]);

        assert_eq!(ctx.response().status(), StatusCode::FORBIDDEN);
        assert!(body(&ctx).contains("|403|"));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn failing_panel_renders_warning() {
        let (services, _conn) = testing::services(true);
        let mut ctx = context(Some("admin_cookie=good"), false);
        let failing = |_view: &dyn RequestView| -> Result<Panel, PanelError> { Err(PanelError::not_found("user 9")) };

        render_page(&mut ctx, &services, &failing, None, &[]);

        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert!(body(&ctx).contains("|Warning|"));
        assert!(body(&ctx).contains("record not found: user 9"));
    }

    #[test]
    fn node_processor_adjusts_a_copy_of_the_buttons() {
        let (services, _conn) = testing::services(true);
        let mut ctx = context(Some("admin_cookie=good"), false);
        let buttons = [NavButton::new("Home", "/admin"), NavButton::new("Logs", "/admin/logs")];
        let hide_logs = |buttons: &mut [NavButton]| {
            for button in buttons.iter_mut().filter(|button| button.title == "Logs") {
                button.hidden = true;
            }
        };

        render_page(&mut ctx, &services, &users_panel, Some(&hide_logs), &buttons);

        assert_eq!(body(&ctx), "layout|admin|Users|<table></table>|Home");
        assert!(!buttons[1].hidden);
    }

    #[test]
    fn strict_template_failure_discards_partial_output() {
        let services = testing::services_with(Config::default(), true, testing::FakeTheme::failing());
        let mut ctx = context(Some("admin_cookie=good"), false);

        render_page(&mut ctx, &services, &users_panel, None, &[]);

        assert_eq!(ctx.response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body(&ctx).contains("partial"));
        assert!(body(&ctx).contains("500 Internal Server Error"));
    }

    #[test]
    fn best_effort_template_failure_sends_partial_output() {
        let config = Config { render_failure: RenderFailure::BestEffort, ..Config::default() };
        let services = testing::services_with(config, true, testing::FakeTheme::failing());
        let mut ctx = context(Some("admin_cookie=good"), false);

        render_page(&mut ctx, &services, &users_panel, None, &[]);

        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(body(&ctx), "partial");
    }
}
