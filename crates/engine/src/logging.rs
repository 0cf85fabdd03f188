use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;

/// Installs a global fmt subscriber at `level`.
///
/// Returns `false`, keeping the existing one, when a global subscriber is already installed.
pub fn init(level: Level) -> bool {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    match tracing::subscriber::set_global_default(subscriber) {
        Ok(()) => true,
        Err(e) => {
            debug!(cause = %e, "global subscriber already installed");
            false
        }
    }
}
