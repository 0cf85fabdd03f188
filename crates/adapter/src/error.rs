use std::io;
use thiserror::Error;

/// Errors raised while binding routes to a native HTTP library.
///
/// These only happen at startup; per-request failures never surface as errors.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("invalid route path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("route conflict at '{path}': {reason}")]
    RouteConflict { path: String, reason: String },

    #[error("native app is not bound, set_app must be called first")]
    AppNotBound,

    #[error("{name} must be set")]
    MissingService { name: &'static str },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl AdapterError {
    pub fn invalid_path<S: ToString>(path: &str, reason: S) -> Self {
        Self::InvalidPath { path: path.to_string(), reason: reason.to_string() }
    }

    pub fn route_conflict<S: ToString>(path: &str, reason: S) -> Self {
        Self::RouteConflict { path: path.to_string(), reason: reason.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin init failed: {reason}")]
    Init { reason: String },
}

impl PluginError {
    pub fn init<S: ToString>(reason: S) -> Self {
        Self::Init { reason: reason.to_string() }
    }
}

/// Failure of a caller-supplied panel function.
#[derive(Error, Debug)]
pub enum PanelError {
    #[error("{reason}")]
    Failed { reason: String },

    #[error("record not found: {what}")]
    NotFound { what: String },
}

impl PanelError {
    pub fn failed<S: ToString>(reason: S) -> Self {
        Self::Failed { reason: reason.to_string() }
    }

    pub fn not_found<S: ToString>(what: S) -> Self {
        Self::NotFound { what: what.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template '{name}' not found")]
    NotFound { name: String },

    #[error("execute template '{name}' error: {reason}")]
    Execute { name: String, reason: String },
}

impl TemplateError {
    pub fn not_found(name: &str) -> Self {
        Self::NotFound { name: name.to_string() }
    }

    pub fn execute<S: ToString>(name: &str, reason: S) -> Self {
        Self::Execute { name: name.to_string(), reason: reason.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("query error: {reason}")]
    Query { reason: String },

    #[error("connection unavailable")]
    Unavailable,
}

impl DbError {
    pub fn query<S: ToString>(reason: S) -> Self {
        Self::Query { reason: reason.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("parse config error: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },
}
