//! The capability surface handed to plugins at load time.
//!
//! A [`CapabilityContext`] bundles every host interface a plugin may touch:
//! the event bus, the command surface, the remote console, persistence,
//! webhook dispatch, and configuration. The manager builds one fresh per
//! plugin; external collaborators (console, database, webhooks) are opaque
//! trait objects supplied by the host.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use warden_commands::{CommandSurface, PlayerDirectory, RemoteConsole};
use warden_events::EventBus;

use crate::error::{BoxError, PluginResult};

/// Opaque access to the host's persistence layer.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a query, returning each row as a JSON object.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, BoxError>;

    /// Run a statement without returning rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<(), BoxError>;
}

impl std::fmt::Debug for dyn Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

/// Opaque access to the host's webhook delivery system.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    /// Dispatch a custom event to every configured webhook.
    async fn dispatch(&self, event: &str, payload: Value) -> Result<(), BoxError>;

    /// Register a custom webhook event type.
    async fn register_event(&self, event_type: &str, description: &str) -> Result<(), BoxError>;
}

impl std::fmt::Debug for dyn WebhookSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSink").finish_non_exhaustive()
    }
}

/// Per-plugin configuration access.
///
/// The typed getters fall back to the supplied default when the key is
/// absent or holds a value of the wrong type.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch a raw value.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store a value.
    async fn set(&self, key: &str, value: Value) -> PluginResult<()>;

    /// Fetch a string value.
    async fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key).await {
            Some(Value::String(s)) => s,
            _ => default.to_string(),
        }
    }

    /// Fetch an integer value.
    async fn get_integer(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .await
            .and_then(|v| v.as_i64())
            .unwrap_or(default)
    }

    /// Fetch a boolean value.
    async fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .await
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }
}

impl std::fmt::Debug for dyn ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore").finish_non_exhaustive()
    }
}

/// In-memory [`ConfigStore`] for tests and plugins without persistent
/// configuration.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, key: &str) -> Option<Value> {
        self.values.read().expect("lock poisoned").get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) -> PluginResult<()> {
        self.values
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// TOML-file-backed [`ConfigStore`].
///
/// Values are cached in memory at load time; `set` writes the whole table
/// back through to the file. Keys are persisted in sorted order, and a gate
/// mutex keeps one file rewrite in flight at a time.
#[derive(Debug)]
pub struct TomlConfigStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, Value>>,
    write_gate: Mutex<()>,
}

impl TomlConfigStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PluginError::Io`] if the file cannot be read and
    /// [`crate::PluginError::ConfigParse`] if it is not valid TOML.
    pub fn open(path: impl Into<PathBuf>) -> PluginResult<Self> {
        let path = path.into();
        let values = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let table: toml::Table = raw.parse()?;
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect()
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
            write_gate: Mutex::new(()),
        })
    }

    /// The file this store persists to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for TomlConfigStore {
    async fn get(&self, key: &str) -> Option<Value> {
        self.values.read().expect("lock poisoned").get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) -> PluginResult<()> {
        let _gate = self.write_gate.lock().await;

        let serialized = {
            let mut values = self.values.write().expect("lock poisoned");
            let previous = values.insert(key.to_string(), value);
            match render_toml(&values) {
                Ok(serialized) => serialized,
                Err(error) => {
                    // Back the insert out; a value TOML cannot represent
                    // must not linger in the cache.
                    match previous {
                        Some(previous) => values.insert(key.to_string(), previous),
                        None => values.remove(key),
                    };
                    return Err(error);
                }
            }
        };

        tokio::fs::write(&self.path, serialized).await?;
        Ok(())
    }
}

/// Render the table to TOML text. Fails when a value has no TOML
/// representation, such as JSON null.
fn render_toml(values: &BTreeMap<String, Value>) -> PluginResult<String> {
    let mut table = toml::Table::new();
    for (key, value) in values {
        table.insert(key.clone(), toml::Value::try_from(value)?);
    }
    Ok(toml::to_string_pretty(&table)?)
}

/// Convert a TOML value into its JSON rendering. Datetimes become strings.
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}

/// The host-side services the manager wires into every plugin's context.
#[derive(Clone)]
pub struct HostServices {
    /// Event bus shared by the host and all plugins.
    pub events: Arc<EventBus>,
    /// Chat command registry.
    pub commands: Arc<CommandSurface>,
    /// Remote console access.
    pub console: Arc<dyn RemoteConsole>,
    /// Persistence access.
    pub database: Arc<dyn Database>,
    /// Webhook delivery.
    pub webhooks: Arc<dyn WebhookSink>,
    /// Plugin configuration backing store.
    pub config: Arc<dyn ConfigStore>,
    /// Directory under which per-plugin directories live.
    pub plugins_dir: PathBuf,
}

impl HostServices {
    /// Create services wired to in-memory and no-op collaborators.
    ///
    /// Real deployments construct the struct directly with live
    /// collaborators; this shape is for tests and examples. The fields are
    /// public, so individual collaborators can be swapped out afterwards.
    #[must_use]
    pub fn for_testing(plugins_dir: PathBuf) -> Self {
        let console: Arc<dyn RemoteConsole> = Arc::new(NullConsole);
        let players: Arc<dyn PlayerDirectory> = Arc::new(NullDirectory);
        Self {
            events: Arc::new(EventBus::new()),
            commands: Arc::new(CommandSurface::new(Arc::clone(&console), players)),
            console,
            database: Arc::new(NullDatabase),
            webhooks: Arc::new(NullWebhooks),
            config: Arc::new(MemoryConfigStore::new()),
            plugins_dir,
        }
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices")
            .field("plugins_dir", &self.plugins_dir)
            .finish_non_exhaustive()
    }
}

struct NullConsole;

#[async_trait]
impl RemoteConsole for NullConsole {
    async fn send(&self, _command: &str) -> Result<String, BoxError> {
        Ok(String::new())
    }

    async fn send_with_timeout(
        &self,
        command: &str,
        _timeout: Duration,
    ) -> Result<String, BoxError> {
        self.send(command).await
    }
}

struct NullDirectory;

#[async_trait]
impl PlayerDirectory for NullDirectory {
    async fn power_of(&self, _guid: &str) -> u32 {
        0
    }

    async fn group_permissions_of(&self, _guid: &str) -> Option<String> {
        None
    }
}

struct NullDatabase;

#[async_trait]
impl Database for NullDatabase {
    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Value>, BoxError> {
        Ok(Vec::new())
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<(), BoxError> {
        Ok(())
    }
}

struct NullWebhooks;

#[async_trait]
impl WebhookSink for NullWebhooks {
    async fn dispatch(&self, _event: &str, _payload: Value) -> Result<(), BoxError> {
        Ok(())
    }

    async fn register_event(&self, _event_type: &str, _description: &str) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Everything a plugin can reach at runtime.
///
/// Built fresh per plugin at load time and shared with the manager for the
/// plugin's whole lifetime.
#[derive(Clone)]
pub struct CapabilityContext {
    /// The plugin this context belongs to.
    pub plugin_id: String,
    /// Directory reserved for this plugin's files.
    pub plugin_dir: PathBuf,
    /// This plugin's configuration file path.
    pub config_path: PathBuf,
    /// Event bus access.
    pub events: Arc<EventBus>,
    /// Command surface access.
    pub commands: Arc<CommandSurface>,
    /// Remote console access.
    pub console: Arc<dyn RemoteConsole>,
    /// Database access.
    pub database: Arc<dyn Database>,
    /// Webhook dispatch.
    pub webhooks: Arc<dyn WebhookSink>,
    /// Configuration access.
    pub config: Arc<dyn ConfigStore>,
    /// Cancelled when the host shuts this plugin down.
    pub shutdown: CancellationToken,
}

impl CapabilityContext {
    /// Build a context for one plugin from the host's services.
    #[must_use]
    pub fn new(
        plugin_id: impl Into<String>,
        services: &HostServices,
        shutdown: CancellationToken,
    ) -> Self {
        let plugin_id = plugin_id.into();
        let plugin_dir = services.plugins_dir.join(&plugin_id);
        let config_path = plugin_dir.join("config.toml");

        Self {
            plugin_id,
            plugin_dir,
            config_path,
            events: Arc::clone(&services.events),
            commands: Arc::clone(&services.commands),
            console: Arc::clone(&services.console),
            database: Arc::clone(&services.database),
            webhooks: Arc::clone(&services.webhooks),
            config: Arc::clone(&services.config),
            shutdown,
        }
    }
}

impl std::fmt::Debug for CapabilityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityContext")
            .field("plugin_id", &self.plugin_id)
            .field("plugin_dir", &self.plugin_dir)
            .finish_non_exhaustive()
    }
}
