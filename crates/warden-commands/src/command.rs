//! Command contributions and their handlers.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BoxError;

/// A single invocation of a command by a player.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    /// In-game display name of the caller.
    pub player_name: String,
    /// Stable GUID of the caller, used for power/permission lookups.
    pub player_guid: String,
    /// Arguments after the command name, already tokenized.
    pub args: Vec<String>,
}

/// Trait implemented by command handlers.
///
/// Handlers run on the chat dispatch path; a returned error is logged,
/// answered with a generic in-game failure message, and propagated to the
/// caller of the surface.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Execute the command for one invocation.
    async fn handle(&self, invocation: CommandInvocation) -> Result<(), BoxError>;
}

impl std::fmt::Debug for dyn CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler").finish_non_exhaustive()
    }
}

/// Adapter that turns an async closure into a [`CommandHandler`].
pub struct FnCommandHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnCommandHandler<F, Fut>
where
    F: Fn(CommandInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> CommandHandler for FnCommandHandler<F, Fut>
where
    F: Fn(CommandInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn handle(&self, invocation: CommandInvocation) -> Result<(), BoxError> {
        (self.f)(invocation).await
    }
}

/// Which of a command's declared requirements gate the chat path.
///
/// Declared-but-unselected requirements are retained as metadata only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementMode {
    /// Both the power level and the permission list must be satisfied.
    #[default]
    Both,
    /// Only the minimum power level is checked.
    Power,
    /// Only the permission list is checked.
    Permission,
}

/// A chat command contributed by a plugin.
///
/// Built with [`CommandSpec::new`] plus the `with_*` builders; everything
/// beyond name, usage and handler is optional.
#[derive(Clone)]
pub struct CommandSpec {
    /// Command name without the chat prefix (`hello`, not `!hello`).
    pub name: String,
    /// Usage string shown to callers on argument errors.
    pub usage: String,
    /// Human-readable description.
    pub description: String,
    /// Minimum number of arguments.
    pub min_args: usize,
    /// Maximum number of arguments; `None` means unlimited.
    pub max_args: Option<usize>,
    /// Minimum power level required to run the command; zero disables the
    /// power check.
    pub min_power: u32,
    /// Permissions, any one of which satisfies the permission check. Empty
    /// disables the permission check.
    pub permissions: Vec<String>,
    /// Which declared requirements actually gate dispatch.
    pub requirement: RequirementMode,
    /// The handler invoked once validation passes.
    pub handler: Arc<dyn CommandHandler>,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("min_power", &self.min_power)
            .field("permissions", &self.permissions)
            .field("requirement", &self.requirement)
            .finish_non_exhaustive()
    }
}

impl CommandSpec {
    /// Create a command with no argument bounds and no requirements.
    pub fn new(
        name: impl Into<String>,
        usage: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            usage: usage.into(),
            description: String::new(),
            min_args: 0,
            max_args: None,
            min_power: 0,
            permissions: Vec::new(),
            requirement: RequirementMode::default(),
            handler,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the minimum argument count.
    #[must_use]
    pub fn with_min_args(mut self, min_args: usize) -> Self {
        self.min_args = min_args;
        self
    }

    /// Set the maximum argument count.
    #[must_use]
    pub fn with_max_args(mut self, max_args: usize) -> Self {
        self.max_args = Some(max_args);
        self
    }

    /// Set the minimum power level.
    #[must_use]
    pub fn with_min_power(mut self, min_power: u32) -> Self {
        self.min_power = min_power;
        self
    }

    /// Add a permission that satisfies the permission check.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Set the requirement mode.
    #[must_use]
    pub fn with_requirement(mut self, requirement: RequirementMode) -> Self {
        self.requirement = requirement;
        self
    }

    /// Handler-free snapshot of the contribution for introspection.
    #[must_use]
    pub fn info(&self) -> CommandInfo {
        CommandInfo {
            name: self.name.clone(),
            usage: self.usage.clone(),
            description: self.description.clone(),
            min_args: self.min_args,
            max_args: self.max_args,
            min_power: self.min_power,
            permissions: self.permissions.clone(),
            requirement: self.requirement,
        }
    }
}

/// Handler-free view of a registered command, for status endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandInfo {
    /// Command name without the chat prefix.
    pub name: String,
    /// Usage string shown to callers on argument errors.
    pub usage: String,
    /// Human-readable description.
    pub description: String,
    /// Minimum number of arguments.
    pub min_args: usize,
    /// Maximum number of arguments; `None` means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_args: Option<usize>,
    /// Minimum power level required.
    pub min_power: u32,
    /// Permissions, any one of which satisfies the permission check.
    pub permissions: Vec<String>,
    /// Which declared requirements gate dispatch.
    pub requirement: RequirementMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler() -> Arc<dyn CommandHandler> {
        Arc::new(FnCommandHandler::new(|_inv| async { Ok(()) }))
    }

    #[test]
    fn test_spec_defaults() {
        let spec = CommandSpec::new("hello", "hello", noop_handler());
        assert_eq!(spec.min_args, 0);
        assert_eq!(spec.max_args, None);
        assert_eq!(spec.min_power, 0);
        assert!(spec.permissions.is_empty());
        assert_eq!(spec.requirement, RequirementMode::Both);
    }

    #[test]
    fn test_spec_builders() {
        let spec = CommandSpec::new("kick", "kick <player> [reason]", noop_handler())
            .with_description("Kick a player from the server")
            .with_min_args(1)
            .with_max_args(2)
            .with_min_power(50)
            .with_permission("moderation.kick")
            .with_requirement(RequirementMode::Permission);

        assert_eq!(spec.min_args, 1);
        assert_eq!(spec.max_args, Some(2));
        assert_eq!(spec.min_power, 50);
        assert_eq!(spec.permissions, vec!["moderation.kick".to_string()]);
        assert_eq!(spec.requirement, RequirementMode::Permission);
    }

    #[test]
    fn test_info_snapshot_serializes() {
        let info = CommandSpec::new("time", "time", noop_handler())
            .with_description("Show server time")
            .info();

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["name"], "time");
        assert_eq!(json["minArgs"], 0);
        assert_eq!(json["requirement"], "both");
        assert!(json.get("maxArgs").is_none());
    }

    #[tokio::test]
    async fn test_fn_handler_receives_invocation() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let seen = Arc::new(AtomicBool::new(false));
        let seen_clone = Arc::clone(&seen);
        let handler = FnCommandHandler::new(move |inv: CommandInvocation| {
            let seen = Arc::clone(&seen_clone);
            async move {
                assert_eq!(inv.player_name, "steve");
                assert_eq!(inv.args, vec!["a".to_string(), "b".to_string()]);
                seen.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        handler
            .handle(CommandInvocation {
                player_name: "steve".to_string(),
                player_guid: "guid-1".to_string(),
                args: vec!["a".to_string(), "b".to_string()],
            })
            .await
            .unwrap();
        assert!(seen.load(Ordering::SeqCst));
    }
}
