use admin_adapter::{AdapterError, PluginError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{name} must be set")]
    Missing { name: &'static str },

    #[error("engine already started, use_app can only be called once")]
    AlreadyStarted,

    #[error("adapter did not hand the native app back")]
    AppMissing,

    #[error("init plugin '{name}' error: {source}")]
    Plugin {
        name: String,
        #[source]
        source: PluginError,
    },

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("adapter '{name}' is already installed")]
    AlreadyInstalled { name: &'static str },
}
