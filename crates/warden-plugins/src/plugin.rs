//! The plugin contract and its descriptor types.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::CapabilityContext;
use crate::error::BoxError;

/// Static metadata a plugin declares about itself.
///
/// Immutable once the plugin is registered; the registry snapshots it at
/// registration time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    /// Unique identifier. Must be non-empty.
    pub id: String,
    /// Display name.
    pub name: String,
    /// The plugin's own version string.
    pub version: String,
    /// Author name.
    pub author: String,
    /// What the plugin does.
    pub description: String,
    /// Plugin website or repository.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub website: String,
    /// IDs of plugins that must be loaded before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Permissions the plugin requires.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    /// Minimum host API version required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_api_version: Option<String>,
    /// Maximum host API version supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_api_version: Option<String>,
    /// Declared resource ceilings, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_budget: Option<ResourceBudget>,
}

/// Optional resource ceilings a plugin declares.
///
/// Absent fields are unbounded. The timeout is descriptive metadata consumed
/// by capability implementations; the monitor does not enforce it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBudget {
    /// Maximum memory in MB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<u64>,
    /// Maximum CPU usage percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cpu_percent: Option<f64>,
    /// Maximum number of concurrent tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tasks: Option<usize>,
    /// Maximum execution time for operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

/// Lifecycle state of a loaded plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Initialized and ready to start.
    Loaded,
    /// Actively running.
    Started,
    /// Stopped after running; may be started again.
    Stopped,
    /// The last transition failed. Retriable: the same operation may be
    /// attempted again.
    Error,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Loaded => "loaded",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Read-only runtime status snapshot for one plugin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStatus {
    /// Plugin identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Plugin version string.
    pub version: String,
    /// Current lifecycle state.
    pub state: PluginState,
    /// Whether the plugin is currently running (state is [`PluginState::Started`]).
    pub enabled: bool,
    /// When the plugin was loaded.
    pub loaded_at: DateTime<Utc>,
    /// Message from the last failed transition, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The contract every plugin implements.
///
/// Hook invocations for the same plugin are serialized by the manager; hooks
/// for different plugins may run concurrently. Hooks always run with the
/// manager's internal lock released, so plugin code may call back into the
/// runtime (for example to register a command during `init`).
#[async_trait]
pub trait Plugin: Send + Sync {
    /// The plugin's static metadata.
    fn descriptor(&self) -> PluginDescriptor;

    /// One-time setup, called when the plugin is loaded.
    ///
    /// The context stays valid for the plugin's whole lifetime; keep a clone
    /// of whatever handles the plugin needs later.
    async fn init(&mut self, context: Arc<CapabilityContext>) -> Result<(), BoxError>;

    /// Begin active operation. Called after `init`, and again after a stop.
    async fn start(&mut self) -> Result<(), BoxError>;

    /// Cease operation. The plugin may be started again afterwards.
    async fn stop(&mut self) -> Result<(), BoxError>;

    /// Re-read configuration without a stop/start cycle.
    async fn reload(&mut self) -> Result<(), BoxError>;
}

impl std::fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.descriptor().id)
            .finish_non_exhaustive()
    }
}

/// A plugin instance shared between the registry and the manager.
///
/// The mutex is what serializes hook invocations for one plugin.
pub type SharedPlugin = Arc<tokio::sync::Mutex<Box<dyn Plugin>>>;
