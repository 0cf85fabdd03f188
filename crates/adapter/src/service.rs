//! Collaborators consumed by the adapter layer and the data they exchange.
//!
//! Authentication rules, permission rules, menus, templates and the database are owned by other
//! parts of the admin panel; this crate only calls into them through the traits below.

use crate::context::Values;
use crate::error::{AdapterError, DbError, TemplateError};
use crate::Config;
use http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The user resolved from a session cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserModel {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub avatar: String,
    pub roles: Vec<String>,
}

/// A rendered content block placed inside the page layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Panel {
    pub title: String,
    pub description: String,
    pub content: String,
}

impl Panel {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self { title: title.into(), description: String::new(), content: content.into() }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Panel shown in place of the requested one when something went wrong.
    pub fn warning(message: &str) -> Self {
        Self::new("Warning", alert("warning", message))
    }

    /// Panel shown when the user lacks permission for the requested page.
    pub fn forbidden() -> Self {
        Self::new("403", alert("danger", "Permission denied")).with_description("Forbidden")
    }

    /// Panel shown after a handler panicked.
    pub fn error(message: &str) -> Self {
        Self::new("500", alert("danger", message)).with_description("Internal Server Error")
    }
}

fn alert(kind: &str, message: &str) -> String {
    format!(r#"<div class="alert alert-{kind}">{}</div>"#, escape_html(message))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub name: String,
    pub url: String,
    pub icon: String,
    pub active: bool,
    pub children: Vec<MenuItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Menu {
    pub items: Vec<MenuItem>,
}

/// A button shown in the top navigation bar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NavButton {
    pub title: String,
    pub icon: String,
    pub url: String,
    pub hidden: bool,
}

impl NavButton {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self { title: title.into(), url: url.into(), ..Self::default() }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }
}

/// Everything a page template is executed with.
#[derive(Debug, Serialize)]
pub struct PageData<'a> {
    pub user: &'a UserModel,
    pub menu: &'a Menu,
    pub panel: &'a Panel,
    pub assets: &'a [String],
    pub buttons: &'a [NavButton],
    pub title: &'a str,
    pub url_prefix: &'a str,
    pub lang: &'a str,
    pub is_pjax: bool,
}

pub trait Connection: Send + Sync {
    fn driver(&self) -> &str;

    /// Inserts one row, returning the new row id.
    fn insert(&self, table: &str, row: &[(&str, String)]) -> Result<u64, DbError>;

    /// Hands the connection back to its pool after a short-lived use.
    fn release(&self) {}
}

pub trait Authenticator: Send + Sync {
    fn resolve(&self, cookie: &str, conn: &dyn Connection) -> Option<UserModel>;
}

#[cfg_attr(test, mockall::automock)]
pub trait PermissionChecker: Send + Sync {
    fn check(&self, user: &UserModel, path: &str, method: &Method, form: &Values) -> bool;
}

pub trait MenuProvider: Send + Sync {
    fn menu(&self, user: &UserModel, path: &str) -> Menu;
}

/// Menu provider for setups without a navigation menu.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyMenu;

impl MenuProvider for EmptyMenu {
    fn menu(&self, _user: &UserModel, _path: &str) -> Menu {
        Menu::default()
    }
}

pub trait Theme: Send + Sync {
    fn name(&self) -> &str;

    /// Name of the template to execute: the full layout, or the pjax fragment.
    fn template_name(&self, is_pjax: bool) -> &str;

    /// Executes the named template into `out`.
    ///
    /// On error `out` may already hold partial output.
    fn execute(&self, template: &str, data: &PageData<'_>, out: &mut Vec<u8>) -> Result<(), TemplateError>;
}

/// The collaborators shared by every adapter and middleware.
#[derive(Clone)]
pub struct Services {
    config: Arc<Config>,
    conn: Arc<dyn Connection>,
    auth: Arc<dyn Authenticator>,
    permission: Arc<dyn PermissionChecker>,
    menu: Arc<dyn MenuProvider>,
    theme: Arc<dyn Theme>,
}

impl Services {
    pub fn builder() -> ServicesBuilder {
        ServicesBuilder::new()
    }

    /// Replaces the config, keeping every collaborator.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn conn(&self) -> &dyn Connection {
        self.conn.as_ref()
    }

    pub fn conn_handle(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.conn)
    }

    pub fn auth(&self) -> &dyn Authenticator {
        self.auth.as_ref()
    }

    pub fn permission(&self) -> &dyn PermissionChecker {
        self.permission.as_ref()
    }

    pub fn menu(&self) -> &dyn MenuProvider {
        self.menu.as_ref()
    }

    pub fn theme(&self) -> &dyn Theme {
        self.theme.as_ref()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .field("driver", &self.conn.driver())
            .field("theme", &self.theme.name())
            .finish_non_exhaustive()
    }
}

pub struct ServicesBuilder {
    config: Option<Config>,
    conn: Option<Arc<dyn Connection>>,
    auth: Option<Arc<dyn Authenticator>>,
    permission: Option<Arc<dyn PermissionChecker>>,
    menu: Option<Arc<dyn MenuProvider>>,
    theme: Option<Arc<dyn Theme>>,
}

impl ServicesBuilder {
    fn new() -> Self {
        Self { config: None, conn: None, auth: None, permission: None, menu: None, theme: None }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn connection(mut self, conn: Arc<dyn Connection>) -> Self {
        self.conn = Some(conn);
        self
    }

    pub fn authenticator(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn permission(mut self, permission: Arc<dyn PermissionChecker>) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn menu(mut self, menu: Arc<dyn MenuProvider>) -> Self {
        self.menu = Some(menu);
        self
    }

    pub fn theme(mut self, theme: Arc<dyn Theme>) -> Self {
        self.theme = Some(theme);
        self
    }

    /// Builds the services; config defaults to [`Config::default`] and the menu to [`EmptyMenu`].
    pub fn build(self) -> Result<Services, AdapterError> {
        Ok(Services {
            config: Arc::new(self.config.unwrap_or_default()),
            conn: self.conn.ok_or(AdapterError::MissingService { name: "connection" })?,
            auth: self.auth.ok_or(AdapterError::MissingService { name: "authenticator" })?,
            permission: self.permission.ok_or(AdapterError::MissingService { name: "permission checker" })?,
            menu: self.menu.unwrap_or_else(|| Arc::new(EmptyMenu)),
            theme: self.theme.ok_or(AdapterError::MissingService { name: "theme" })?,
        })
    }
}

impl fmt::Debug for ServicesBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicesBuilder").field("config", &self.config).finish_non_exhaustive()
    }
}
