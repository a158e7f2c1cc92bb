//! Plugin runtime error types.

/// Boxed error returned by plugin-author code (hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from plugin runtime operations.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The descriptor declares an empty identifier.
    #[error("plugin ID cannot be empty")]
    EmptyIdentifier,

    /// A plugin with this ID is already registered.
    #[error("plugin {0} already registered")]
    DuplicateIdentifier(String),

    /// The requested plugin is not known to the registry or manager.
    #[error("plugin not found: {0}")]
    UnknownPlugin(String),

    /// One or more declared dependencies are not registered.
    #[error("missing dependencies for plugin {plugin_id}: {}", .missing.join(", "))]
    MissingDependency {
        /// The plugin whose dependencies are unsatisfied.
        plugin_id: String,
        /// Dependency IDs that are not registered.
        missing: Vec<String>,
    },

    /// One or more dependencies are registered but not in a usable state.
    #[error("incompatible dependencies for plugin {plugin_id}: {}", .incompatible.join(", "))]
    IncompatibleDependency {
        /// The plugin whose dependencies are unsatisfied.
        plugin_id: String,
        /// Dependency IDs, each annotated with its offending state.
        incompatible: Vec<String>,
    },

    /// A dependency cycle was detected.
    #[error("circular dependency detected: {}", .path.join(" -> "))]
    CircularDependency {
        /// The offending chain, or the unresolved plugin set when the
        /// cycle was found during load-order sorting.
        path: Vec<String>,
    },

    /// A version string is not three dotted numeric parts.
    #[error("invalid version format: {0} (expected major.minor.patch)")]
    InvalidVersionFormat(String),

    /// The host API version falls outside a plugin's declared bounds.
    #[error("plugin {plugin_id} requires API version {required}, but current version is {actual}")]
    IncompatibleVersion {
        /// The plugin declaring the bounds.
        plugin_id: String,
        /// The declared `min-max` range.
        required: String,
        /// The host's actual API version.
        actual: String,
    },

    /// The plugin has already been loaded.
    #[error("plugin {0} is already loaded")]
    AlreadyLoaded(String),

    /// The plugin's initializer failed.
    #[error("plugin {plugin_id} initialization failed: {source}")]
    InitializationFailed {
        /// The plugin that failed to initialize.
        plugin_id: String,
        /// The error its initializer returned.
        #[source]
        source: BoxError,
    },

    /// A start/stop/reload hook failed.
    #[error("plugin {plugin_id} {operation} failed: {source}")]
    Hook {
        /// The plugin whose hook failed.
        plugin_id: String,
        /// Which hook failed (`start`, `stop`, or `reload`).
        operation: &'static str,
        /// The error the hook returned.
        #[source]
        source: BoxError,
    },

    /// The plugin is not registered with the resource monitor.
    #[error("plugin not being monitored: {0}")]
    NotMonitored(String),

    /// A plugin exceeded one or more dimensions of its resource budget.
    ///
    /// Report-only: the monitor records the violation but never stops or
    /// throttles the plugin.
    #[error("resource limit violations for plugin {plugin_id}: {}", .violations.join("; "))]
    ResourceLimitExceeded {
        /// The plugin over budget.
        plugin_id: String,
        /// One description per exceeded dimension.
        violations: Vec<String>,
    },

    /// One or more plugins failed during a batch hot reload.
    #[error("failed to reload {} plugin(s): {}", .failed.len(), .failed.join(", "))]
    HotReloadFailed {
        /// IDs of the plugins whose reload failed.
        failed: Vec<String>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a plugin configuration file.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Failed to serialize plugin configuration.
    #[error("config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Command surface error surfaced through the capability context.
    #[error(transparent)]
    Command(#[from] warden_commands::CommandError),
}

/// Result type for plugin runtime operations.
pub type PluginResult<T> = Result<T, PluginError>;
