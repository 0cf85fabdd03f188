use crate::error::RegistryError;
use admin_adapter::WebFramework;
use once_cell::sync::OnceCell;
use std::fmt;
use tracing::info;

/// Holds the one active adapter of an engine.
///
/// Written once when the engine starts and read-only afterwards.
pub struct AdapterRegistry<W> {
    slot: OnceCell<W>,
}

impl<W: WebFramework> AdapterRegistry<W> {
    pub fn new() -> Self {
        Self { slot: OnceCell::new() }
    }

    /// Installs `adapter`, failing when one is already installed.
    pub fn install(&self, adapter: W) -> Result<&W, RegistryError> {
        match self.slot.try_insert(adapter) {
            Ok(installed) => {
                info!(adapter = installed.name(), "adapter installed");
                Ok(installed)
            }
            Err((current, _rejected)) => Err(RegistryError::AlreadyInstalled { name: current.name() }),
        }
    }

    pub fn get(&self) -> Option<&W> {
        self.slot.get()
    }

    pub fn name(&self) -> Option<&'static str> {
        self.slot.get().map(WebFramework::name)
    }
}

impl<W: WebFramework> Default for AdapterRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: WebFramework> fmt::Debug for AdapterRegistry<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry").field("adapter", &self.name()).finish()
    }
}
