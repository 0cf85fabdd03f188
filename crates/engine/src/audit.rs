//! The operation log: one row per request handled for an authenticated user.

use admin_adapter::{Config, Connection, Context, UserModel};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const REDACTED: &str = "******";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationLog {
    pub user_id: i64,
    pub path: String,
    pub method: String,
    pub ip: String,
    /// Form values as JSON, secrets redacted.
    pub input: String,
    pub created_at: u64,
}

impl OperationLog {
    pub fn from_context(ctx: &Context, user: &UserModel) -> Self {
        let form = ctx
            .form()
            .iter()
            .map(|(key, values)| {
                let values = if is_secret(key) { vec![REDACTED.to_string()] } else { values.clone() };
                (key.as_str(), values)
            })
            .collect::<BTreeMap<_, _>>();

        Self {
            user_id: user.id,
            path: ctx.path().to_string(),
            method: ctx.method().to_string(),
            ip: ctx.client_ip(),
            input: serde_json::to_string(&form).unwrap_or_else(|_| "{}".to_string()),
            created_at: SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_secs()).unwrap_or_default(),
        }
    }

    pub fn row(&self) -> Vec<(&'static str, String)> {
        vec![
            ("user_id", self.user_id.to_string()),
            ("path", self.path.clone()),
            ("method", self.method.clone()),
            ("ip", self.ip.clone()),
            ("input", self.input.clone()),
            ("created_at", self.created_at.to_string()),
        ]
    }
}

fn is_secret(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("password") || key.contains("token")
}

/// Writes the operation log row of a finished request, if the config enables it and the
/// request carries an authenticated user.
///
/// A failed insert is logged and otherwise ignored.
pub fn record(ctx: &Context, config: &Config, conn: &dyn Connection) {
    if !config.operation_log {
        return;
    }
    let Some(user) = ctx.user() else {
        return;
    };

    let log = OperationLog::from_context(ctx, user);
    match conn.insert(&config.operation_log_table, &log.row()) {
        Ok(id) => debug!(id, user = log.user_id, path = %log.path, "operation logged"),
        Err(e) => warn!(driver = conn.driver(), cause = %e, "write operation log error"),
    }
}
