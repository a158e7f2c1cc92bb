//! Command surface error types.

/// Boxed error type returned by command handlers and collaborator traits.
///
/// Handlers are written by plugin authors; the surface only needs to log
/// and relay their failures, so the concrete type is erased.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from command surface operations.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// A command with this name is already registered.
    #[error("command '{0}' is already registered")]
    AlreadyRegistered(String),

    /// No command with this name is registered.
    #[error("command '{0}' is not registered")]
    NotFound(String),

    /// The contribution was rejected at registration time.
    #[error("invalid command: {0}")]
    Invalid(String),

    /// The caller does not meet the command's power or permission
    /// requirements.
    #[error("permission denied for command '{command}'")]
    PermissionDenied {
        /// The command the caller was denied.
        command: String,
    },

    /// The command's handler returned an error.
    #[error("handler for command '{command}' failed")]
    HandlerFailed {
        /// The command whose handler failed.
        command: String,
        /// The handler's error.
        #[source]
        source: BoxError,
    },
}

/// Result type for command surface operations.
pub type CommandResult<T> = Result<T, CommandError>;
