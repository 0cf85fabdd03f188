mod common;

use admin_adapter::binding::{Adapter, HyperApp, HyperBinding, MemoryApp, MemoryBinding, MemoryExchange};
use admin_adapter::{
    Config, Handler, Panel, PanelError, PluginError, Plugin, RequestView, Route, RoutePlugin, handler_fn,
};
use admin_engine::{Engine, EngineError};
use bytes::Bytes;
use common::SESSION;
use http::header::{self, HeaderValue};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use std::sync::Arc;

fn memory_engine(config: Config) -> (Engine<Adapter<MemoryBinding>>, Arc<common::RecordingConn>) {
    let (services, conn) = common::services(config);
    let engine = Engine::builder().services(services).adapter(Adapter::new()).build().unwrap();
    (engine, conn)
}

fn echo_id() -> Handler {
    handler_fn(|ctx| {
        let id = ctx.query("id").unwrap_or_default().to_string();
        ctx.write(id.as_bytes());
    })
}

fn users_panel(_view: &dyn RequestView) -> Result<Panel, PanelError> {
    Ok(Panel::new("Users", "<table></table>"))
}

fn get(uri: &str) -> Request<Bytes> {
    Request::get(uri).body(Bytes::new()).unwrap()
}

fn get_with(uri: &str, headers: &[(&'static str, &'static str)]) -> Request<Bytes> {
    let mut request = get(uri);
    for (name, value) in headers {
        request.headers_mut().append(*name, HeaderValue::from_static(*value));
    }
    request
}

fn text(response: &http::Response<Bytes>) -> String {
    String::from_utf8(response.body().to_vec()).unwrap()
}

#[test]
fn path_parameters_reach_the_query_map() {
    let (mut engine, _conn) = memory_engine(Config::default());
    engine.add_plugin(RoutePlugin::new("users", "").public_route(Method::GET, "/users/:id", echo_id()));
    let app = engine.use_app(MemoryApp::new()).unwrap();

    let response = app.dispatch(get("/users/42"));
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(&response), "42");
}

#[tokio::test]
async fn path_parameters_reach_the_query_map_over_hyper() {
    let (services, _conn) = common::services(Config::default());
    let mut engine = Engine::builder().services(services).adapter(Adapter::<HyperBinding>::new()).build().unwrap();
    engine.add_plugin(RoutePlugin::new("users", "").public_route(Method::GET, "/users/:id", echo_id()));
    let service = engine.use_app(HyperApp::new()).unwrap().into_service();

    let request = Request::get("/users/42").body(Full::new(Bytes::new())).unwrap();
    let response = service.handle(request, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.into_body().collect().await.unwrap().to_bytes().as_ref(), b"42");
    assert_eq!(engine.registry().name(), Some("hyper"));
}

#[test]
fn pjax_requests_get_the_partial_template() {
    let (mut engine, _conn) = memory_engine(Config::default());
    engine.html(Method::GET, "/info/users", users_panel);
    let app = engine.use_app(MemoryApp::new()).unwrap();

    let full = app.dispatch(get_with("/admin/info/users", &[("cookie", SESSION)]));
    assert_eq!(full.status(), StatusCode::OK);
    assert_eq!(full.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
    assert_eq!(text(&full), "layout|admin|Users|<table></table>");

    let partial = app.dispatch(get_with("/admin/info/users", &[("cookie", SESSION), ("x-pjax", "true")]));
    assert_eq!(text(&partial), "pjax|admin|Users|<table></table>");
}

#[test]
fn panics_are_logged_and_answered_with_an_error_page() {
    let (logs, _guard) = common::capture_logs();
    let (mut engine, _conn) = memory_engine(Config::default());
    engine.data(Method::GET, "/boom", handler_fn(|_ctx| panic!("boom")));
    engine.data(Method::GET, "/fine", handler_fn(|ctx| ctx.write(b"fine")));
    let app = engine.use_app(MemoryApp::new()).unwrap();

    let response = app.dispatch(get_with("/admin/boom", &[("cookie", SESSION)]));
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text(&response), "layout|admin|500|<div class=\"alert alert-danger\">Internal Server Error</div>");

    let output = logs.contents();
    assert!(output.contains("handler panicked"));
    assert!(output.contains("boom"));
    assert!(output.contains("backtrace="));

    let response = app.dispatch(get_with("/admin/fine", &[("cookie", SESSION)]));
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(&response), "fine");
}

#[test]
fn panicking_theme_still_gets_an_error_page() {
    let (logs, _guard) = common::capture_logs();
    let (services, _conn) = common::services_with_theme(Config::default(), Arc::new(common::PanickingTheme));
    let mut engine = Engine::builder().services(services).adapter(Adapter::<MemoryBinding>::new()).build().unwrap();
    engine.html_public(Method::GET, "/about", |_view: &dyn RequestView| Ok(Panel::new("About", "admin-kit")));
    let app = engine.use_app(MemoryApp::new()).unwrap();

    let response = app.dispatch(get("/admin/about"));
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text(&response).contains("<h1>500 Internal Server Error</h1>"));
    assert!(text(&response).starts_with("<!DOCTYPE html>"));
    assert_eq!(app.pooled(), 1);

    let output = logs.contents();
    assert!(output.contains("template exploded"));
    assert!(output.contains("render error page panicked"));

    assert_eq!(text(&app.dispatch(get("/admin/health"))), "ok");
}

#[test]
fn panics_answer_json_clients_with_json() {
    let config = Config { debug: true, ..Config::default() };
    let (mut engine, conn) = memory_engine(config);
    engine.data(Method::POST, "/boom", handler_fn(|_ctx| panic!("boom")));
    let app = engine.use_app(MemoryApp::new()).unwrap();

    let mut request = get_with("/admin/boom", &[("cookie", SESSION), ("accept", "application/json")]);
    *request.method_mut() = Method::POST;
    let response = app.dispatch(request);

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(text(&response), r#"{"code":500,"msg":"boom"}"#);
    assert!(conn.rows().is_empty());
}

#[test]
fn protected_routes_need_a_session() {
    let (mut engine, _conn) = memory_engine(Config::default());
    engine.html(Method::GET, "/info/users", users_panel);
    let app = engine.use_app(MemoryApp::new()).unwrap();

    let response = app.dispatch(get("/admin/info/users"));
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/admin/login");

    let response = app.dispatch(get_with("/admin/info/users", &[("cookie", "admin_cookie=expired")]));
    assert_eq!(response.status(), StatusCode::FOUND);

    let response = app.dispatch(get_with("/admin/info/users", &[("accept", "application/json")]));
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(text(&response), r#"{"code":401,"msg":"unauthorized"}"#);
}

#[test]
fn denied_permission_renders_the_forbidden_panel() {
    let (mut engine, _conn) = memory_engine(Config::default());
    engine.html(Method::GET, "/secret/report", users_panel);
    let app = engine.use_app(MemoryApp::new()).unwrap();

    let response = app.dispatch(get_with("/admin/secret/report", &[("cookie", SESSION)]));
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(text(&response).starts_with("layout|admin|403|"));

    let response = app.dispatch(get_with("/admin/secret/report", &[("cookie", SESSION), ("accept", "application/json")]));
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(text(&response), r#"{"code":403,"msg":"permission denied"}"#);
}

#[test]
fn maintenance_mode_short_circuits_every_route() {
    let config = Config { maintenance: true, ..Config::default() };
    let (mut engine, _conn) = memory_engine(config);
    engine.html(Method::GET, "/info/users", users_panel);
    let app = engine.use_app(MemoryApp::new()).unwrap();

    let response = app.dispatch(get_with("/admin/info/users", &[("cookie", SESSION)]));
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(text(&response).contains("maintenance"));

    let response = app.dispatch(get_with("/admin/health", &[("accept", "application/json")]));
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(text(&response), r#"{"code":503,"msg":"service under maintenance"}"#);
}

#[test]
fn operations_of_signed_in_users_are_logged() {
    let (mut engine, conn) = memory_engine(Config::default());
    engine.data(Method::POST, "/info/users/new", handler_fn(|ctx| ctx.write(b"saved")));
    engine.data_public(Method::POST, "/signin", handler_fn(|ctx| ctx.write(b"welcome")));
    let app = engine.use_app(MemoryApp::new()).unwrap();

    let request = Request::post("/admin/info/users/new?page=1")
        .header(header::COOKIE, SESSION)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header("x-forwarded-for", "203.0.113.9")
        .body(Bytes::from_static(b"name=bob"))
        .unwrap();
    assert_eq!(text(&app.dispatch(request)), "saved");

    let anonymous = Request::post("/admin/signin").body(Bytes::new()).unwrap();
    assert_eq!(text(&app.dispatch(anonymous)), "welcome");

    let rows = conn.rows();
    assert_eq!(rows.len(), 1);
    let (table, row) = &rows[0];
    assert_eq!(table, "admin_operation_log");
    let field = |name: &str| row.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str());
    assert_eq!(field("user_id"), Some("1"));
    assert_eq!(field("path"), Some("/admin/info/users/new"));
    assert_eq!(field("method"), Some("POST"));
    assert_eq!(field("ip"), Some("203.0.113.9"));
    assert_eq!(field("input"), Some(r#"{"name":["bob"]}"#));
}

#[test]
fn health_route_is_public() {
    let (mut engine, _conn) = memory_engine(Config::default());
    let app = engine.use_app(MemoryApp::new()).unwrap();

    let response = app.dispatch(get("/admin/health"));
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(&response), "ok");

    let response = app.dispatch(get_with("/admin/health", &[("accept", "application/json")]));
    assert_eq!(text(&response), r#"{"status":"ok"}"#);
}

#[test]
fn public_pages_render_without_a_user() {
    let (mut engine, _conn) = memory_engine(Config::default());
    engine.html_public(Method::GET, "/about", |_view: &dyn RequestView| Ok(Panel::new("About", "admin-kit")));
    let app = engine.use_app(MemoryApp::new()).unwrap();

    let response = app.dispatch(get("/admin/about"));
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(&response), "layout||About|admin-kit");
}

#[test]
fn engine_starts_once() {
    let (mut engine, _conn) = memory_engine(Config::default());
    engine.use_app(MemoryApp::new()).unwrap();

    let err = engine.use_app(MemoryApp::new()).unwrap_err();
    assert!(matches!(err, EngineError::AlreadyStarted));
    assert_eq!(engine.registry().name(), Some("memory"));
}

#[test]
fn builder_requires_services_and_adapter() {
    let err = Engine::<Adapter<MemoryBinding>>::builder().adapter(Adapter::new()).build().unwrap_err();
    assert!(matches!(err, EngineError::Missing { name: "services" }));

    let (services, _conn) = common::services(Config::default());
    let err = Engine::<Adapter<MemoryBinding>>::builder().services(services).build().unwrap_err();
    assert!(matches!(err, EngineError::Missing { name: "adapter" }));
}

#[test]
fn builder_config_overrides_the_services_config() {
    let (services, _conn) = common::services(Config::default());
    let config = Config { url_prefix: "manage".into(), ..Config::default() };
    let mut engine = Engine::builder().services(services).config(config).adapter(Adapter::<MemoryBinding>::new()).build().unwrap();
    let app = engine.use_app(MemoryApp::new()).unwrap();

    assert_eq!(engine.config().url_prefix, "manage");
    assert_eq!(app.dispatch(get("/manage/health")).status(), StatusCode::OK);
    assert_eq!(app.dispatch(get("/admin/health")).status(), StatusCode::NOT_FOUND);
}

struct Broken;

impl Plugin for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn init(&mut self, _middleware: &dyn admin_adapter::Middleware) -> Result<(), PluginError> {
        Err(PluginError::init("missing table definitions"))
    }

    fn routes(&self) -> &[Route] {
        &[]
    }
}

#[test]
fn plugin_init_failure_stops_startup() {
    let (mut engine, _conn) = memory_engine(Config::default());
    engine.add_plugin(Broken);

    let err = engine.use_app(MemoryApp::new()).unwrap_err();
    assert!(matches!(err, EngineError::Plugin { ref name, .. } if name == "broken"));
    assert!(engine.registry().get().is_none());
}

#[test]
fn conflicting_routes_fail_startup() {
    let (mut engine, _conn) = memory_engine(Config::default());
    engine.data(Method::GET, "/users/:id", echo_id());
    engine.data(Method::GET, "/users/:uid", echo_id());

    let err = engine.use_app(MemoryApp::new()).unwrap_err();
    assert!(matches!(err, EngineError::Adapter(admin_adapter::AdapterError::RouteConflict { .. })));
}

#[test]
fn content_renders_from_native_handlers() {
    let (engine, _conn) = memory_engine(Config::default());
    let request = get_with("/admin/info/users", &[("cookie", SESSION)]);
    let mut exchange = MemoryExchange::from_request(request, None);

    engine.content(&mut exchange, &users_panel);
    assert_eq!(exchange.status(), StatusCode::OK);
    assert_eq!(exchange.response_body(), b"layout|admin|Users|<table></table>");

    let mut anonymous = MemoryExchange::from_request(get("/admin/info/users"), None);
    assert_eq!(engine.user(&mut exchange).map(|user| user.id), Some(1));
    assert!(engine.user(&mut anonymous).is_none());
}
