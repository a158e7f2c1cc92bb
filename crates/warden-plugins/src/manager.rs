//! Plugin lifecycle orchestration.
//!
//! The manager owns the lifecycle bookkeeping for every loaded plugin and
//! wires each one to the host's capability surfaces at load time. Lock
//! discipline: the bookkeeping map is a synchronous `RwLock` that is never
//! held across an await; lifecycle hooks run under the plugin's own async
//! mutex only, so one slow plugin never blocks operations on another.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_commands::CommandSurface;
use warden_events::EventBus;

use crate::context::{CapabilityContext, HostServices};
use crate::error::{PluginError, PluginResult};
use crate::monitor::{DEFAULT_MONITOR_INTERVAL, ResourceMonitor, ResourceSample};
use crate::plugin::{PluginDescriptor, PluginState, PluginStatus, SharedPlugin};
use crate::registry::PluginRegistry;
use crate::resolver::DependencyResolver;
use crate::version::{HOST_API_VERSION, validate_compatibility};

/// Bookkeeping for one loaded plugin.
struct LoadedPlugin {
    instance: SharedPlugin,
    descriptor: PluginDescriptor,
    state: PluginState,
    loaded_at: DateTime<Utc>,
    last_error: Option<String>,
}

impl LoadedPlugin {
    fn status(&self) -> PluginStatus {
        PluginStatus {
            id: self.descriptor.id.clone(),
            name: self.descriptor.name.clone(),
            version: self.descriptor.version.clone(),
            state: self.state,
            enabled: self.state == PluginState::Started,
            loaded_at: self.loaded_at,
            error: self.last_error.clone(),
        }
    }
}

/// Drives registered plugins through their lifecycle.
///
/// Plugins come from a shared [`PluginRegistry`], are loaded in dependency
/// order, and are handed a fresh [`CapabilityContext`] at load time. A hook
/// failure during start, stop, or reload moves the plugin to
/// [`PluginState::Error`] and records the failure on its status.
pub struct PluginManager {
    registry: Arc<PluginRegistry>,
    resolver: DependencyResolver,
    services: HostServices,
    monitor: ResourceMonitor,
    api_version: RwLock<String>,
    loaded: RwLock<HashMap<String, LoadedPlugin>>,
    shutdown: CancellationToken,
}

impl PluginManager {
    /// Creates a manager over `registry`, wiring plugin contexts from
    /// `services`.
    #[must_use]
    pub fn new(registry: Arc<PluginRegistry>, services: HostServices) -> Self {
        Self {
            resolver: DependencyResolver::new(Arc::clone(&registry)),
            registry,
            services,
            monitor: ResourceMonitor::new(DEFAULT_MONITOR_INTERVAL),
            api_version: RwLock::new(HOST_API_VERSION.to_string()),
            loaded: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Loads every registered plugin in dependency order.
    ///
    /// Starts the resource monitor, resolves a load order (falling back to
    /// registration order when resolution fails), and initializes each
    /// plugin that is not already loaded. Individual failures are logged
    /// and skipped. Returns the number of plugins loaded by this call.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub async fn load_all(&self) -> usize {
        let ids = self.registry.ids();
        if ids.is_empty() {
            info!("no plugins to load");
            return 0;
        }

        self.monitor.start().await;

        let order = match self.resolver.load_order(&ids) {
            Ok(order) => order,
            Err(error) => {
                error!(%error, "failed to resolve load order, using registration order");
                ids
            }
        };

        let mut count = 0usize;
        for id in order {
            if self.is_loaded(&id) {
                continue;
            }
            match self.load_plugin(&id).await {
                Ok(()) => count = count.saturating_add(1),
                Err(error) => error!(plugin_id = %id, %error, "failed to load plugin"),
            }
        }
        info!(count, "plugins loaded");
        count
    }

    /// Runs a plugin's start hook and marks it enabled.
    ///
    /// Starting an already-started plugin is a no-op. Budget checks run
    /// before the hook and only warn; they never block the start.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`] if the plugin is not loaded
    /// and [`PluginError::Hook`] if the start hook fails, in which case the
    /// plugin is left in [`PluginState::Error`].
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub async fn start(&self, id: &str) -> PluginResult<()> {
        let instance = self.instance_of(id)?;

        let mut plugin = instance.lock().await;
        // The state can change while waiting for the plugin mutex.
        if self.state_of(id)? == PluginState::Started {
            return Ok(());
        }

        self.monitor.register(id).await;
        let budget = {
            let loaded = self.loaded.read().expect("lock poisoned");
            loaded
                .get(id)
                .and_then(|entry| entry.descriptor.resource_budget)
        };
        if let Err(error) = self.monitor.check_limits(id, budget.as_ref()) {
            warn!(plugin_id = %id, %error, "resource budget exceeded");
        }

        debug!(plugin_id = %id, "starting plugin");
        let result = plugin.start().await;
        drop(plugin);

        match result {
            Ok(()) => {
                self.commit_state(id, PluginState::Started, None);
                info!(plugin_id = %id, "plugin started");
                Ok(())
            }
            Err(source) => {
                let error = PluginError::Hook {
                    plugin_id: id.to_owned(),
                    operation: "start",
                    source,
                };
                self.commit_state(id, PluginState::Error, Some(error.to_string()));
                Err(error)
            }
        }
    }

    /// Runs a plugin's stop hook and releases its monitoring slot.
    ///
    /// The hook runs regardless of the plugin's current state, so a plugin
    /// that never started can still be stopped.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`] if the plugin is not loaded
    /// and [`PluginError::Hook`] if the stop hook fails, in which case the
    /// plugin is left in [`PluginState::Error`].
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub async fn stop(&self, id: &str) -> PluginResult<()> {
        let instance = self.instance_of(id)?;

        let mut plugin = instance.lock().await;
        debug!(plugin_id = %id, "stopping plugin");
        let result = plugin.stop().await;
        drop(plugin);

        match result {
            Ok(()) => {
                self.commit_state(id, PluginState::Stopped, None);
                self.monitor.unregister(id);
                info!(plugin_id = %id, "plugin stopped");
                Ok(())
            }
            Err(source) => {
                let error = PluginError::Hook {
                    plugin_id: id.to_owned(),
                    operation: "stop",
                    source,
                };
                self.commit_state(id, PluginState::Error, Some(error.to_string()));
                Err(error)
            }
        }
    }

    /// Runs a plugin's reload hook.
    ///
    /// A successful reload leaves the plugin's state untouched; a failed
    /// one moves it to [`PluginState::Error`].
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`] if the plugin is not loaded
    /// and [`PluginError::Hook`] if the reload hook fails.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub async fn reload(&self, id: &str) -> PluginResult<()> {
        let instance = self.instance_of(id)?;

        let mut plugin = instance.lock().await;
        debug!(plugin_id = %id, "reloading plugin");
        let result = plugin.reload().await;
        drop(plugin);

        match result {
            Ok(()) => {
                info!(plugin_id = %id, "plugin reloaded");
                Ok(())
            }
            Err(source) => {
                let error = PluginError::Hook {
                    plugin_id: id.to_owned(),
                    operation: "reload",
                    source,
                };
                self.commit_state(id, PluginState::Error, Some(error.to_string()));
                Err(error)
            }
        }
    }

    /// Starts every loaded plugin, logging and continuing past failures.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub async fn start_all(&self) {
        for id in self.loaded_ids() {
            if let Err(error) = self.start(&id).await {
                error!(plugin_id = %id, %error, "failed to start plugin");
            }
        }
    }

    /// Stops every started plugin, logging and continuing past failures.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub async fn stop_all(&self) {
        for id in self.ids_in_state(PluginState::Started) {
            if let Err(error) = self.stop(&id).await {
                error!(plugin_id = %id, %error, "failed to stop plugin");
            }
        }
    }

    /// Stops every started plugin, the resource monitor, and cancels every
    /// plugin context's shutdown token.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub async fn shutdown(&self) {
        info!("shutting down plugin manager");
        self.stop_all().await;
        self.monitor.stop();
        self.shutdown.cancel();
    }

    /// Returns the status of every loaded plugin, sorted by plugin ID.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn status(&self) -> Vec<PluginStatus> {
        let loaded = self.loaded.read().expect("lock poisoned");
        let mut statuses: Vec<PluginStatus> = loaded.values().map(LoadedPlugin::status).collect();
        drop(loaded);
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Returns the status of one loaded plugin.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`] if the plugin is not loaded.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn plugin_status(&self, id: &str) -> PluginResult<PluginStatus> {
        let loaded = self.loaded.read().expect("lock poisoned");
        loaded
            .get(id)
            .map(LoadedPlugin::status)
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_owned()))
    }

    /// The API version plugins are validated against.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn api_version(&self) -> String {
        self.api_version.read().expect("lock poisoned").clone()
    }

    /// Replaces the API version used for compatibility checks on later
    /// loads.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn set_api_version(&self, version: impl Into<String>) {
        let version = version.into();
        debug!(version = %version, "api version changed");
        *self.api_version.write().expect("lock poisoned") = version;
    }

    /// Resolves the transitive dependency tree of one registered plugin.
    ///
    /// # Errors
    ///
    /// Propagates [`DependencyResolver::dependency_tree`] errors.
    pub fn dependency_tree(&self, id: &str) -> PluginResult<HashMap<String, Vec<String>>> {
        self.resolver.dependency_tree(id)
    }

    /// Resolves the load order of every registered plugin.
    ///
    /// # Errors
    ///
    /// Propagates [`DependencyResolver::load_order`] errors.
    pub fn load_order(&self) -> PluginResult<Vec<String>> {
        self.resolver.load_order(&self.registry.ids())
    }

    /// Returns the latest resource sample for one plugin.
    ///
    /// # Errors
    ///
    /// Propagates [`ResourceMonitor::metrics`] errors.
    pub fn metrics(&self, id: &str) -> PluginResult<ResourceSample> {
        self.monitor.metrics(id)
    }

    /// Returns the latest resource sample of every monitored plugin.
    #[must_use]
    pub fn all_metrics(&self) -> Vec<ResourceSample> {
        self.monitor.all_metrics()
    }

    /// The event bus shared with plugins.
    #[must_use]
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.services.events)
    }

    /// The command surface shared with plugins.
    #[must_use]
    pub fn commands(&self) -> Arc<CommandSurface> {
        Arc::clone(&self.services.commands)
    }

    /// The resource monitor backing budget checks.
    #[must_use]
    pub fn monitor(&self) -> &ResourceMonitor {
        &self.monitor
    }

    /// The plugin registry this manager drives.
    #[must_use]
    pub fn registry(&self) -> Arc<PluginRegistry> {
        Arc::clone(&self.registry)
    }

    async fn load_plugin(&self, id: &str) -> PluginResult<()> {
        if self.is_loaded(id) {
            return Err(PluginError::AlreadyLoaded(id.to_owned()));
        }

        let instance = self
            .registry
            .get(id)
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_owned()))?;
        let descriptor = self
            .registry
            .descriptor(id)
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_owned()))?;

        {
            let api_version = self.api_version.read().expect("lock poisoned");
            validate_compatibility(&api_version, &descriptor)?;
        }
        self.resolver.validate(&descriptor, &self.states())?;

        let shutdown = self.shutdown.child_token();
        let context = Arc::new(CapabilityContext::new(id, &self.services, shutdown.clone()));

        debug!(plugin_id = %id, "initializing plugin");
        {
            let mut plugin = instance.lock().await;
            if let Err(source) = plugin.init(Arc::clone(&context)).await {
                shutdown.cancel();
                return Err(PluginError::InitializationFailed {
                    plugin_id: id.to_owned(),
                    source,
                });
            }
        }

        let version = descriptor.version.clone();
        let entry = LoadedPlugin {
            instance,
            descriptor,
            state: PluginState::Loaded,
            loaded_at: Utc::now(),
            last_error: None,
        };

        let already_loaded = {
            let mut loaded = self.loaded.write().expect("lock poisoned");
            match loaded.entry(id.to_owned()) {
                Entry::Occupied(_) => true,
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                    false
                }
            }
        };
        if already_loaded {
            // A racing load won the commit; back this one out.
            shutdown.cancel();
            return Err(PluginError::AlreadyLoaded(id.to_owned()));
        }

        self.monitor.register(id).await;
        info!(plugin_id = %id, version = %version, "plugin loaded");
        Ok(())
    }

    fn is_loaded(&self, id: &str) -> bool {
        self.loaded.read().expect("lock poisoned").contains_key(id)
    }

    fn instance_of(&self, id: &str) -> PluginResult<SharedPlugin> {
        let loaded = self.loaded.read().expect("lock poisoned");
        loaded
            .get(id)
            .map(|entry| Arc::clone(&entry.instance))
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_owned()))
    }

    fn state_of(&self, id: &str) -> PluginResult<PluginState> {
        let loaded = self.loaded.read().expect("lock poisoned");
        loaded
            .get(id)
            .map(|entry| entry.state)
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_owned()))
    }

    fn states(&self) -> HashMap<String, PluginState> {
        let loaded = self.loaded.read().expect("lock poisoned");
        loaded
            .iter()
            .map(|(id, entry)| (id.clone(), entry.state))
            .collect()
    }

    fn commit_state(&self, id: &str, state: PluginState, last_error: Option<String>) {
        let mut loaded = self.loaded.write().expect("lock poisoned");
        if let Some(entry) = loaded.get_mut(id) {
            entry.state = state;
            entry.last_error = last_error;
        }
    }

    fn loaded_ids(&self) -> Vec<String> {
        let loaded = self.loaded.read().expect("lock poisoned");
        let mut ids: Vec<String> = loaded.keys().cloned().collect();
        drop(loaded);
        ids.sort();
        ids
    }

    fn ids_in_state(&self, state: PluginState) -> Vec<String> {
        let loaded = self.loaded.read().expect("lock poisoned");
        let mut ids: Vec<String> = loaded
            .iter()
            .filter(|(_, entry)| entry.state == state)
            .map(|(id, _)| id.clone())
            .collect();
        drop(loaded);
        ids.sort();
        ids
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("registered", &self.registry.len())
            .field("loaded", &self.loaded.read().expect("lock poisoned").len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::BoxError;
    use crate::plugin::Plugin;

    fn services() -> HostServices {
        HostServices::for_testing(PathBuf::from("/srv/warden/plugins"))
    }

    type CallLog = Arc<StdMutex<Vec<String>>>;
    type Captured = Arc<StdMutex<Option<Arc<CapabilityContext>>>>;

    struct FixturePlugin {
        descriptor: PluginDescriptor,
        calls: CallLog,
        fail: Option<&'static str>,
        captured: Captured,
    }

    impl FixturePlugin {
        fn record(&self, hook: &'static str) -> Result<(), BoxError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{hook}", self.descriptor.id));
            if self.fail == Some(hook) {
                return Err(format!("{hook} refused").into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Plugin for FixturePlugin {
        fn descriptor(&self) -> PluginDescriptor {
            self.descriptor.clone()
        }

        async fn init(&mut self, context: Arc<CapabilityContext>) -> Result<(), BoxError> {
            *self.captured.lock().unwrap() = Some(context);
            self.record("init")
        }

        async fn start(&mut self) -> Result<(), BoxError> {
            self.record("start")
        }

        async fn stop(&mut self) -> Result<(), BoxError> {
            self.record("stop")
        }

        async fn reload(&mut self) -> Result<(), BoxError> {
            self.record("reload")
        }
    }

    fn make_descriptor(id: &str, dependencies: &[&str]) -> PluginDescriptor {
        PluginDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            version: "1.0.0".to_string(),
            dependencies: dependencies.iter().map(ToString::to_string).collect(),
            ..PluginDescriptor::default()
        }
    }

    fn plugin(descriptor: PluginDescriptor, calls: &CallLog) -> Box<FixturePlugin> {
        Box::new(FixturePlugin {
            descriptor,
            calls: Arc::clone(calls),
            fail: None,
            captured: Arc::default(),
        })
    }

    fn failing(
        descriptor: PluginDescriptor,
        calls: &CallLog,
        hook: &'static str,
    ) -> Box<FixturePlugin> {
        let mut fixture = plugin(descriptor, calls);
        fixture.fail = Some(hook);
        fixture
    }

    fn manager_with(plugins: Vec<Box<FixturePlugin>>) -> PluginManager {
        let registry = Arc::new(PluginRegistry::new());
        for fixture in plugins {
            registry.register(fixture).unwrap();
        }
        PluginManager::new(registry, services())
    }

    #[tokio::test]
    async fn load_all_follows_dependency_order() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![
            plugin(make_descriptor("b", &["a"]), &calls),
            plugin(make_descriptor("a", &[]), &calls),
        ]);

        assert_eq!(manager.load_all().await, 2);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["a:init".to_string(), "b:init".to_string()]
        );
    }

    #[tokio::test]
    async fn load_all_skips_dependents_of_failed_plugins() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![
            plugin(make_descriptor("b", &["a"]), &calls),
            failing(make_descriptor("a", &[]), &calls, "init"),
        ]);

        assert_eq!(manager.load_all().await, 0);
        assert!(manager.status().is_empty());
        assert_eq!(*calls.lock().unwrap(), vec!["a:init".to_string()]);
    }

    #[tokio::test]
    async fn load_all_skips_already_loaded_plugins() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![plugin(make_descriptor("a", &[]), &calls)]);

        assert_eq!(manager.load_all().await, 1);
        assert_eq!(manager.load_all().await, 0);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_all_rejects_incompatible_api_versions() {
        let calls: CallLog = Arc::default();
        let mut descriptor = make_descriptor("strict", &[]);
        descriptor.min_api_version = Some("2.0.0".to_string());
        let manager = manager_with(vec![plugin(descriptor, &calls)]);

        assert_eq!(manager.load_all().await, 0);
        assert!(calls.lock().unwrap().is_empty());
        assert!(matches!(
            manager.plugin_status("strict"),
            Err(PluginError::UnknownPlugin(_))
        ));
    }

    #[tokio::test]
    async fn circular_dependencies_are_not_loaded() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![
            plugin(make_descriptor("x", &["y"]), &calls),
            plugin(make_descriptor("y", &["x"]), &calls),
        ]);

        assert_eq!(manager.load_all().await, 0);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_marks_plugin_enabled() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![plugin(make_descriptor("a", &[]), &calls)]);
        manager.load_all().await;

        manager.start("a").await.unwrap();

        let status = manager.plugin_status("a").unwrap();
        assert_eq!(status.state, PluginState::Started);
        assert!(status.enabled);
        assert!(status.error.is_none());
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["a:init".to_string(), "a:start".to_string()]
        );
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![plugin(make_descriptor("a", &[]), &calls)]);
        manager.load_all().await;

        manager.start("a").await.unwrap();
        manager.start("a").await.unwrap();

        let starts = calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.ends_with(":start"))
            .count();
        assert_eq!(starts, 1);
    }

    #[tokio::test]
    async fn start_failure_moves_plugin_to_error_state() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![failing(make_descriptor("a", &[]), &calls, "start")]);
        manager.load_all().await;

        let err = manager.start("a").await.unwrap_err();
        assert!(matches!(
            &err,
            PluginError::Hook {
                plugin_id,
                operation: "start",
                ..
            } if plugin_id == "a"
        ));

        let status = manager.plugin_status("a").unwrap();
        assert_eq!(status.state, PluginState::Error);
        assert!(!status.enabled);
        assert!(status.error.unwrap().contains("start refused"));
    }

    #[tokio::test]
    async fn stop_runs_hook_and_releases_monitoring() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![plugin(make_descriptor("a", &[]), &calls)]);
        manager.load_all().await;
        manager.start("a").await.unwrap();

        manager.stop("a").await.unwrap();

        let status = manager.plugin_status("a").unwrap();
        assert_eq!(status.state, PluginState::Stopped);
        assert!(!status.enabled);
        assert!(matches!(
            manager.metrics("a"),
            Err(PluginError::NotMonitored(_))
        ));
    }

    #[tokio::test]
    async fn stop_does_not_require_a_started_plugin() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![plugin(make_descriptor("a", &[]), &calls)]);
        manager.load_all().await;

        manager.stop("a").await.unwrap();

        assert_eq!(
            manager.plugin_status("a").unwrap().state,
            PluginState::Stopped
        );
        assert!(calls.lock().unwrap().contains(&"a:stop".to_string()));
    }

    #[tokio::test]
    async fn stop_failure_moves_plugin_to_error_state() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![failing(make_descriptor("a", &[]), &calls, "stop")]);
        manager.load_all().await;
        manager.start("a").await.unwrap();

        let err = manager.stop("a").await.unwrap_err();
        assert!(matches!(
            err,
            PluginError::Hook {
                operation: "stop",
                ..
            }
        ));
        assert_eq!(
            manager.plugin_status("a").unwrap().state,
            PluginState::Error
        );
    }

    #[tokio::test]
    async fn reload_preserves_state_on_success() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![plugin(make_descriptor("a", &[]), &calls)]);
        manager.load_all().await;
        manager.start("a").await.unwrap();

        manager.reload("a").await.unwrap();

        assert_eq!(
            manager.plugin_status("a").unwrap().state,
            PluginState::Started
        );
        assert!(calls.lock().unwrap().contains(&"a:reload".to_string()));
    }

    #[tokio::test]
    async fn reload_failure_moves_plugin_to_error_state() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![failing(make_descriptor("a", &[]), &calls, "reload")]);
        manager.load_all().await;
        manager.start("a").await.unwrap();

        let err = manager.reload("a").await.unwrap_err();
        assert!(matches!(
            err,
            PluginError::Hook {
                operation: "reload",
                ..
            }
        ));
        assert_eq!(
            manager.plugin_status("a").unwrap().state,
            PluginState::Error
        );
    }

    #[tokio::test]
    async fn start_all_and_stop_all_cover_every_plugin() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![
            plugin(make_descriptor("a", &[]), &calls),
            plugin(make_descriptor("b", &[]), &calls),
        ]);
        manager.load_all().await;

        manager.start_all().await;
        assert!(
            manager
                .status()
                .iter()
                .all(|status| status.state == PluginState::Started)
        );

        manager.stop_all().await;
        assert!(
            manager
                .status()
                .iter()
                .all(|status| status.state == PluginState::Stopped)
        );
    }

    #[tokio::test]
    async fn stop_all_ignores_plugins_that_never_started() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![
            plugin(make_descriptor("a", &[]), &calls),
            plugin(make_descriptor("b", &[]), &calls),
        ]);
        manager.load_all().await;
        manager.start("a").await.unwrap();

        manager.stop_all().await;

        assert_eq!(
            manager.plugin_status("a").unwrap().state,
            PluginState::Stopped
        );
        assert_eq!(
            manager.plugin_status("b").unwrap().state,
            PluginState::Loaded
        );
        assert!(!calls.lock().unwrap().contains(&"b:stop".to_string()));
    }

    #[tokio::test]
    async fn status_is_sorted_by_id() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![
            plugin(make_descriptor("zeta", &[]), &calls),
            plugin(make_descriptor("alpha", &[]), &calls),
        ]);
        manager.load_all().await;

        let ids: Vec<String> = manager.status().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[tokio::test]
    async fn init_receives_wired_context() {
        let calls: CallLog = Arc::default();
        let captured: Captured = Arc::default();
        let fixture = Box::new(FixturePlugin {
            descriptor: make_descriptor("a", &[]),
            calls: Arc::clone(&calls),
            fail: None,
            captured: Arc::clone(&captured),
        });
        let registry = Arc::new(PluginRegistry::new());
        registry.register(fixture).unwrap();
        let host = services();
        let plugins_dir = host.plugins_dir.clone();
        let manager = PluginManager::new(registry, host);

        manager.load_all().await;

        let context = captured.lock().unwrap().clone().unwrap();
        assert_eq!(context.plugin_id, "a");
        assert_eq!(context.plugin_dir, plugins_dir.join("a"));
        assert_eq!(context.config_path, plugins_dir.join("a").join("config.toml"));
        assert!(!context.shutdown.is_cancelled());

        manager.shutdown().await;
        assert!(context.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn api_version_can_be_replaced() {
        let calls: CallLog = Arc::default();
        let mut descriptor = make_descriptor("strict", &[]);
        descriptor.min_api_version = Some("2.0.0".to_string());
        let manager = manager_with(vec![plugin(descriptor, &calls)]);

        manager.set_api_version("2.1.0");
        assert_eq!(manager.api_version(), "2.1.0");
        assert_eq!(manager.load_all().await, 1);
    }

    #[tokio::test]
    async fn resolver_and_monitor_pass_throughs() {
        let calls: CallLog = Arc::default();
        let manager = manager_with(vec![
            plugin(make_descriptor("a", &[]), &calls),
            plugin(make_descriptor("b", &["a"]), &calls),
        ]);
        manager.load_all().await;

        let tree = manager.dependency_tree("b").unwrap();
        assert_eq!(tree["b"], vec!["a".to_string()]);
        assert_eq!(
            manager.load_order().unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(manager.all_metrics().len(), 2);
        assert!(manager.metrics("a").is_ok());
    }

    #[tokio::test]
    async fn operations_on_unknown_plugins_error() {
        let manager = manager_with(Vec::new());

        assert!(matches!(
            manager.start("ghost").await,
            Err(PluginError::UnknownPlugin(_))
        ));
        assert!(matches!(
            manager.stop("ghost").await,
            Err(PluginError::UnknownPlugin(_))
        ));
        assert!(matches!(
            manager.reload("ghost").await,
            Err(PluginError::UnknownPlugin(_))
        ));
        assert!(matches!(
            manager.plugin_status("ghost"),
            Err(PluginError::UnknownPlugin(_))
        ));
    }
}
