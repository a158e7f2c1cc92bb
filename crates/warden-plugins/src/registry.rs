//! Process-wide catalog of known plugin implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::{PluginError, PluginResult};
use crate::plugin::{Plugin, PluginDescriptor, SharedPlugin};

struct RegistryEntry {
    instance: SharedPlugin,
    descriptor: PluginDescriptor,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, RegistryEntry>,
    order: Vec<String>,
}

/// Catalog of registered plugin implementations, keyed by identifier.
///
/// The host registers every plugin at startup; entries are never removed at
/// runtime. Each descriptor is snapshotted at registration time and stays
/// immutable afterwards. Registration order is preserved so the manager can
/// fall back to it when dependency resolution fails.
#[derive(Default)]
pub struct PluginRegistry {
    state: RwLock<RegistryState>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.state.read().map(|s| s.entries.len()).unwrap_or_default();
        f.debug_struct("PluginRegistry")
            .field("plugin_count", &count)
            .finish()
    }
}

impl PluginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin implementation.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::EmptyIdentifier`] if the descriptor's ID is
    /// blank and [`PluginError::DuplicateIdentifier`] if a plugin with the
    /// same ID is already registered.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn register(&self, plugin: Box<dyn Plugin>) -> PluginResult<()> {
        let descriptor = plugin.descriptor();
        if descriptor.id.is_empty() {
            return Err(PluginError::EmptyIdentifier);
        }

        let mut state = self.state.write().expect("lock poisoned");
        if state.entries.contains_key(&descriptor.id) {
            return Err(PluginError::DuplicateIdentifier(descriptor.id));
        }

        let id = descriptor.id.clone();
        state.order.push(id.clone());
        state.entries.insert(
            id.clone(),
            RegistryEntry {
                instance: Arc::new(tokio::sync::Mutex::new(plugin)),
                descriptor,
            },
        );
        drop(state);

        debug!(plugin_id = %id, "Plugin registered");
        Ok(())
    }

    /// The shared instance for a plugin, if registered.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<SharedPlugin> {
        let state = self.state.read().expect("lock poisoned");
        state.entries.get(id).map(|e| Arc::clone(&e.instance))
    }

    /// The descriptor snapshot for a plugin, if registered.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn descriptor(&self, id: &str) -> Option<PluginDescriptor> {
        let state = self.state.read().expect("lock poisoned");
        state.entries.get(id).map(|e| e.descriptor.clone())
    }

    /// Descriptor snapshots for every registered plugin, in registration
    /// order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        let state = self.state.read().expect("lock poisoned");
        state
            .order
            .iter()
            .filter_map(|id| state.entries.get(id).map(|e| e.descriptor.clone()))
            .collect()
    }

    /// Every registered plugin ID, in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.state.read().expect("lock poisoned").order.clone()
    }

    /// Number of registered plugins.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").entries.len()
    }

    /// Whether no plugins are registered.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
