//! Hot reload coordination.
//!
//! Wraps a [`PluginManager`] with a stop, reload, start sequence so a
//! running plugin can pick up new configuration without a host restart. A
//! gate mutex serializes hot reloads against each other; ordinary
//! lifecycle calls go through the manager and are unaffected.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{PluginError, PluginResult};
use crate::manager::PluginManager;
use crate::plugin::PluginState;

/// Serializes stop-reload-start sequences over one [`PluginManager`].
///
/// Constructed by the host alongside the manager it wraps.
#[derive(Debug)]
pub struct HotReloader {
    manager: Arc<PluginManager>,
    gate: Mutex<()>,
}

impl HotReloader {
    /// Creates a reloader over `manager`.
    #[must_use]
    pub fn new(manager: Arc<PluginManager>) -> Self {
        Self {
            manager,
            gate: Mutex::new(()),
        }
    }

    /// Runs one plugin through a full hot-reload sequence.
    ///
    /// A started plugin is stopped first and restarted afterwards; a plugin
    /// in any other state only has its reload hook run. If the reload hook
    /// fails on a previously started plugin, a restart is attempted so the
    /// plugin keeps serving with its old configuration.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error: status lookup, stop, reload,
    /// or restart.
    pub async fn reload(&self, id: &str) -> PluginResult<()> {
        let _gate = self.gate.lock().await;
        info!(plugin_id = %id, "hot reloading plugin");

        let status = self.manager.plugin_status(id)?;
        let was_started = status.state == PluginState::Started;

        if was_started {
            self.manager.stop(id).await?;
        }

        if let Err(error) = self.manager.reload(id).await {
            if was_started {
                // Best effort: put the plugin back in service with its old
                // configuration.
                if let Err(restart_error) = self.manager.start(id).await {
                    warn!(
                        plugin_id = %id,
                        error = %restart_error,
                        "failed to restart plugin after reload failure"
                    );
                }
            }
            return Err(error);
        }

        if was_started {
            if let Err(error) = self.manager.start(id).await {
                error!(plugin_id = %id, %error, "failed to restart plugin after reload");
                return Err(error);
            }
        }

        info!(plugin_id = %id, "plugin hot reloaded");
        Ok(())
    }

    /// Hot reloads every started plugin.
    ///
    /// Failures are collected rather than aborting the pass; each plugin is
    /// reloaded under its own gate acquisition.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::HotReloadFailed`] naming every plugin whose
    /// reload failed.
    pub async fn reload_all(&self) -> PluginResult<()> {
        let started: Vec<String> = self
            .manager
            .status()
            .into_iter()
            .filter(|status| status.state == PluginState::Started)
            .map(|status| status.id)
            .collect();

        let mut failed = Vec::new();
        for id in started {
            if let Err(error) = self.reload(&id).await {
                error!(plugin_id = %id, %error, "hot reload failed");
                failed.push(id);
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(PluginError::HotReloadFailed { failed })
        }
    }
}
