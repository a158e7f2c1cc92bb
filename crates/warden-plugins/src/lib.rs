//! Warden Plugins - lifecycle runtime for the Warden plugin system.
//!
//! This crate provides:
//! - The [`Plugin`] trait and the [`PluginDescriptor`] metadata plugins
//!   declare
//! - The [`PluginRegistry`] plugin instances are registered into
//! - The [`PluginManager`] driving init, start, stop, and reload hooks in
//!   dependency order
//! - The [`CapabilityContext`] handed to every plugin at load time
//! - Host resource sampling with report-only budgets ([`ResourceMonitor`])
//! - Hot reload sequencing ([`HotReloader`])
//!
//! # Architecture
//!
//! The manager keeps its bookkeeping in a synchronous map that is never
//! held across an await. Lifecycle hooks run under each plugin's own async
//! mutex, so hooks for different plugins never serialize against each
//! other and a slow hook never blocks status queries. API compatibility
//! ([`ApiVersion`] bounds) and declared dependencies are validated before
//! a plugin's init hook runs.
//!
//! # Example
//!
//! ```rust
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use warden_plugins::{
//!     BoxError, CapabilityContext, HostServices, Plugin, PluginDescriptor, PluginManager,
//!     PluginRegistry,
//! };
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Plugin for Greeter {
//!     fn descriptor(&self) -> PluginDescriptor {
//!         PluginDescriptor {
//!             id: "greeter".to_string(),
//!             name: "Greeter".to_string(),
//!             version: "1.0.0".to_string(),
//!             ..PluginDescriptor::default()
//!         }
//!     }
//!
//!     async fn init(&mut self, context: Arc<CapabilityContext>) -> Result<(), BoxError> {
//!         println!("loading into {}", context.plugin_dir.display());
//!         Ok(())
//!     }
//!
//!     async fn start(&mut self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//!
//!     async fn stop(&mut self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//!
//!     async fn reload(&mut self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() {
//! let registry = Arc::new(PluginRegistry::new());
//! registry.register(Box::new(Greeter)).unwrap();
//!
//! let services = HostServices::for_testing(PathBuf::from("/srv/warden/plugins"));
//! let manager = PluginManager::new(registry, services);
//!
//! manager.load_all().await;
//! manager.start_all().await;
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod error;
mod manager;
mod monitor;
mod plugin;
mod registry;
mod reload;
mod resolver;
mod version;

pub use context::{
    CapabilityContext, ConfigStore, Database, HostServices, MemoryConfigStore, TomlConfigStore,
    WebhookSink,
};
pub use error::{BoxError, PluginError, PluginResult};
pub use manager::PluginManager;
pub use monitor::{DEFAULT_MONITOR_INTERVAL, ResourceMonitor, ResourceSample};
pub use plugin::{Plugin, PluginDescriptor, PluginState, PluginStatus, ResourceBudget, SharedPlugin};
pub use registry::PluginRegistry;
pub use reload::HotReloader;
pub use resolver::DependencyResolver;
pub use version::{ApiVersion, HOST_API_VERSION, validate_compatibility};
