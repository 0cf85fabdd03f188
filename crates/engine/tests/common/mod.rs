#![allow(dead_code, reason = "each test binary uses a different subset")]

use admin_adapter::{
    Authenticator, Config, Connection, DbError, PageData, PermissionChecker, Services, TemplateError, Theme, UserModel,
    Values,
};
use http::Method;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

pub const SESSION: &str = "admin_cookie=good";

pub type Row = Vec<(String, String)>;

#[derive(Debug, Default)]
pub struct RecordingConn {
    rows: Mutex<Vec<(String, Row)>>,
}

impl RecordingConn {
    pub fn rows(&self) -> Vec<(String, Row)> {
        self.rows.lock().unwrap().clone()
    }
}

impl Connection for RecordingConn {
    fn driver(&self) -> &str {
        "recording"
    }

    fn insert(&self, table: &str, row: &[(&str, String)]) -> Result<u64, DbError> {
        let mut rows = self.rows.lock().unwrap();
        rows.push((table.to_string(), row.iter().map(|(key, value)| ((*key).to_string(), value.clone())).collect()));
        Ok(rows.len() as u64)
    }
}

pub struct SessionAuth {
    sessions: HashMap<String, UserModel>,
}

impl Authenticator for SessionAuth {
    fn resolve(&self, cookie: &str, _conn: &dyn Connection) -> Option<UserModel> {
        self.sessions.get(cookie).cloned()
    }
}

/// Allows everything except paths containing `/secret`.
pub struct PathPermission;

impl PermissionChecker for PathPermission {
    fn check(&self, _user: &UserModel, path: &str, _method: &Method, _form: &Values) -> bool {
        !path.contains("/secret")
    }
}

/// Renders `template|username|panel title|panel content`.
pub struct PlainTheme;

impl Theme for PlainTheme {
    fn name(&self) -> &str {
        "plain"
    }

    fn template_name(&self, is_pjax: bool) -> &str {
        if is_pjax { "pjax" } else { "layout" }
    }

    fn execute(&self, template: &str, data: &PageData<'_>, out: &mut Vec<u8>) -> Result<(), TemplateError> {
        let page = format!("{template}|{}|{}|{}", data.user.username, data.panel.title, data.panel.content);
        out.extend_from_slice(page.as_bytes());
        Ok(())
    }
}

pub fn admin() -> UserModel {
    UserModel { id: 1, name: "Administrator".into(), username: "admin".into(), ..UserModel::default() }
}

/// A theme whose templates always panic.
pub struct PanickingTheme;

impl Theme for PanickingTheme {
    fn name(&self) -> &str {
        "panicking"
    }

    fn template_name(&self, _is_pjax: bool) -> &str {
        "layout"
    }

    fn execute(&self, _template: &str, _data: &PageData<'_>, out: &mut Vec<u8>) -> Result<(), TemplateError> {
        out.extend_from_slice(b"<html>");
        panic!("template exploded");
    }
}

pub fn services(config: Config) -> (Services, Arc<RecordingConn>) {
    services_with_theme(config, Arc::new(PlainTheme))
}

pub fn services_with_theme(config: Config, theme: Arc<dyn Theme>) -> (Services, Arc<RecordingConn>) {
    let conn = Arc::new(RecordingConn::default());
    let sessions = HashMap::from([("good".to_string(), admin())]);
    let services = Services::builder()
        .config(config)
        .connection(conn.clone())
        .authenticator(Arc::new(SessionAuth { sessions }))
        .permission(Arc::new(PathPermission))
        .theme(theme)
        .build()
        .unwrap();
    (services, conn)
}

/// Log output captured from the current thread.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Captures logs of the current thread until the guard is dropped.
pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}
