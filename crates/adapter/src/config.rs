use crate::base::{DEFAULT_CONTENT_TYPE, DEFAULT_COOKIE_KEY};
use crate::error::ConfigError;
use crate::handler::join_path;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What to do when a page template fails half-way through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderFailure {
    /// Discard the partial output and answer `500` with a built-in error page.
    #[default]
    Strict,
    /// Log the failure and send whatever the template produced.
    BestEffort,
}

/// Admin panel settings, loaded once at startup and read-only afterwards.
///
/// Every field has a default, so a config file only needs to name what it changes.
///
/// ```
/// use admin_adapter::{Config, RenderFailure};
///
/// let config = Config::from_json_str(r#"{"url_prefix": "manage", "render_failure": "best_effort"}"#).unwrap();
/// assert_eq!(config.url("/info/users"), "/manage/info/users");
/// assert_eq!(config.cookie_name, "admin_cookie");
/// assert_eq!(config.render_failure, RenderFailure::BestEffort);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub url_prefix: String,
    pub cookie_name: String,
    pub login_url: String,
    pub index_url: String,
    pub title: String,
    pub language: String,
    pub content_type: String,
    pub assets: Vec<String>,
    pub maintenance: bool,
    pub operation_log: bool,
    pub operation_log_table: String,
    pub render_failure: RenderFailure,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url_prefix: "admin".into(),
            cookie_name: DEFAULT_COOKIE_KEY.into(),
            login_url: "/login".into(),
            index_url: "/".into(),
            title: "Admin".into(),
            language: "en".into(),
            content_type: DEFAULT_CONTENT_TYPE.into(),
            assets: Vec::new(),
            maintenance: false,
            operation_log: true,
            operation_log_table: "admin_operation_log".into(),
            render_failure: RenderFailure::Strict,
            debug: false,
        }
    }
}

impl Config {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Absolute url of an admin path, under the configured prefix.
    pub fn url(&self, path: &str) -> String {
        join_path(&self.url_prefix, path)
    }

    /// Absolute url of the url prefix itself.
    pub fn prefix(&self) -> String {
        join_path(&self.url_prefix, "")
    }

    pub fn login_location(&self) -> String {
        self.url(&self.login_url)
    }
}
