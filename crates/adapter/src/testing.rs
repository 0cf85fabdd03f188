//! In-memory collaborators for unit tests.

use crate::config::Config;
use crate::context::Values;
use crate::error::{DbError, TemplateError};
use crate::service::{Authenticator, Connection, PageData, PermissionChecker, Services, Theme, UserModel};
use http::Method;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub(crate) struct FakeConn {
    inserted: AtomicUsize,
    released: AtomicUsize,
}

impl FakeConn {
    pub(crate) fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl Connection for FakeConn {
    fn driver(&self) -> &str {
        "fake"
    }

    fn insert(&self, _table: &str, _row: &[(&str, String)]) -> Result<u64, DbError> {
        Ok(self.inserted.fetch_add(1, Ordering::SeqCst) as u64 + 1)
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeAuth {
    sessions: HashMap<String, UserModel>,
}

impl FakeAuth {
    pub(crate) fn with_session(mut self, cookie: &str, user: UserModel) -> Self {
        self.sessions.insert(cookie.to_string(), user);
        self
    }
}

impl Authenticator for FakeAuth {
    fn resolve(&self, cookie: &str, _conn: &dyn Connection) -> Option<UserModel> {
        self.sessions.get(cookie).cloned()
    }
}

#[derive(Debug)]
pub(crate) struct AllowAll(pub(crate) bool);

impl PermissionChecker for AllowAll {
    fn check(&self, _user: &UserModel, _path: &str, _method: &Method, _form: &Values) -> bool {
        self.0
    }
}

/// Renders `template|username|panel title|panel content|visible button titles`.
#[derive(Debug, Default)]
pub(crate) struct FakeTheme {
    fail: bool,
}

impl FakeTheme {
    pub(crate) fn failing() -> Self {
        Self { fail: true }
    }
}

impl Theme for FakeTheme {
    fn name(&self) -> &str {
        "fake"
    }

    fn template_name(&self, is_pjax: bool) -> &str {
        if is_pjax { "pjax" } else { "layout" }
    }

    fn execute(&self, template: &str, data: &PageData<'_>, out: &mut Vec<u8>) -> Result<(), TemplateError> {
        if self.fail {
            out.extend_from_slice(b"partial");
            return Err(TemplateError::execute(template, "unexpected end of template"));
        }
        let buttons =
            data.buttons.iter().filter(|button| !button.hidden).map(|button| button.title.as_str()).collect::<Vec<_>>();
        let page = format!(
            "{template}|{}|{}|{}|{}",
            data.user.username,
            data.panel.title,
            data.panel.content,
            buttons.join(",")
        );
        out.extend_from_slice(page.as_bytes());
        Ok(())
    }
}

pub(crate) fn admin() -> UserModel {
    UserModel { id: 1, name: "Administrator".into(), username: "admin".into(), ..UserModel::default() }
}

/// Services with one valid session, cookie value `good`.
pub(crate) fn services(permitted: bool) -> (Arc<Services>, Arc<FakeConn>) {
    let conn = Arc::new(FakeConn::default());
    let services = Services::builder()
        .connection(conn.clone())
        .authenticator(Arc::new(FakeAuth::default().with_session("good", admin())))
        .permission(Arc::new(AllowAll(permitted)))
        .theme(Arc::new(FakeTheme::default()))
        .build()
        .unwrap();
    (Arc::new(services), conn)
}

pub(crate) fn services_with(config: Config, permitted: bool, theme: FakeTheme) -> Arc<Services> {
    let services = Services::builder()
        .config(config)
        .connection(Arc::new(FakeConn::default()))
        .authenticator(Arc::new(FakeAuth::default().with_session("good", admin())))
        .permission(Arc::new(AllowAll(permitted)))
        .theme(Arc::new(theme))
        .build()
        .unwrap();
    Arc::new(services)
}
