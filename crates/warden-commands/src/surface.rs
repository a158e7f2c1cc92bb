//! Command registry and chat dispatch.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, error, info, warn};

use crate::command::{CommandInfo, CommandInvocation, CommandSpec, RequirementMode};
use crate::console::RemoteConsole;
use crate::error::{CommandError, CommandResult};
use crate::player::PlayerDirectory;

/// How [`CommandSurface::process_chat`] disposed of a chat line.
///
/// Argument and permission rejections are answered in-game and reported
/// here rather than as errors; only handler failures are `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOutcome {
    /// The name is not a registered plugin command; the line belongs to
    /// someone else.
    NotRegistered,
    /// Argument bounds were violated; a usage hint was sent to the caller.
    UsageSent,
    /// The caller failed the power or permission check and was told so.
    Denied,
    /// The handler ran to completion.
    Executed,
}

/// Registry and dispatcher for plugin-contributed chat commands.
///
/// Plugins register [`CommandSpec`]s through their capability context; the
/// chat pipeline feeds incoming lines to [`process_chat`]
/// (`CommandSurface::process_chat`), which validates before dispatching.
pub struct CommandSurface {
    commands: RwLock<HashMap<String, CommandSpec>>,
    console: Arc<dyn RemoteConsole>,
    players: Arc<dyn PlayerDirectory>,
}

impl std::fmt::Debug for CommandSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.commands.read().map(|c| c.len()).unwrap_or_default();
        f.debug_struct("CommandSurface")
            .field("command_count", &count)
            .finish()
    }
}

impl CommandSurface {
    /// Create a surface wired to the given collaborators.
    #[must_use]
    pub fn new(console: Arc<dyn RemoteConsole>, players: Arc<dyn PlayerDirectory>) -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            console,
            players,
        }
    }

    /// Register a command contribution.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::AlreadyRegistered`] if the name is taken and
    /// [`CommandError::Invalid`] if the name is empty.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn register(&self, spec: CommandSpec) -> CommandResult<()> {
        let mut commands = self.commands.write().expect("lock poisoned");

        if commands.contains_key(&spec.name) {
            return Err(CommandError::AlreadyRegistered(spec.name));
        }
        if spec.name.is_empty() {
            return Err(CommandError::Invalid(
                "command name cannot be empty".to_string(),
            ));
        }

        let name = spec.name.clone();
        commands.insert(name.clone(), spec);
        drop(commands);

        info!(command = %name, "Plugin command registered");
        Ok(())
    }

    /// Remove a command by name.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::NotFound`] if no such command is registered.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn unregister(&self, name: &str) -> CommandResult<()> {
        let mut commands = self.commands.write().expect("lock poisoned");
        if commands.remove(name).is_none() {
            return Err(CommandError::NotFound(name.to_string()));
        }
        drop(commands);

        info!(command = %name, "Plugin command unregistered");
        Ok(())
    }

    /// Execute a command programmatically, bypassing argument and
    /// permission validation.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::NotFound`] if the command is not registered
    /// and [`CommandError::HandlerFailed`] if the handler errors.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub async fn execute(
        &self,
        player_name: &str,
        player_guid: &str,
        name: &str,
        args: Vec<String>,
    ) -> CommandResult<()> {
        let handler = {
            let commands = self.commands.read().expect("lock poisoned");
            let spec = commands
                .get(name)
                .ok_or_else(|| CommandError::NotFound(name.to_string()))?;
            Arc::clone(&spec.handler)
        };

        handler
            .handle(CommandInvocation {
                player_name: player_name.to_string(),
                player_guid: player_guid.to_string(),
                args,
            })
            .await
            .map_err(|source| CommandError::HandlerFailed {
                command: name.to_string(),
                source,
            })
    }

    /// Dispatch a chat-triggered command.
    ///
    /// Validates argument-count bounds, then the caller's power level and
    /// group permissions as selected by the command's
    /// [`RequirementMode`], messaging the caller in-game on any rejection.
    /// Permission matching is substring containment against the group's
    /// serialized permission list.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::HandlerFailed`] if the handler errors; every
    /// validation rejection is an `Ok` [`ChatOutcome`] instead.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub async fn process_chat(
        &self,
        player_name: &str,
        player_guid: &str,
        name: &str,
        args: Vec<String>,
    ) -> CommandResult<ChatOutcome> {
        let spec = {
            let commands = self.commands.read().expect("lock poisoned");
            match commands.get(name) {
                Some(spec) => spec.clone(),
                None => return Ok(ChatOutcome::NotRegistered),
            }
        };

        let out_of_bounds =
            args.len() < spec.min_args || spec.max_args.is_some_and(|max| args.len() > max);
        if out_of_bounds {
            self.send_player_message(player_name, &format!("Usage: !{}", spec.usage))
                .await;
            return Ok(ChatOutcome::UsageSent);
        }

        if let Err(e) = self.check_requirements(&spec, player_guid).await {
            debug!(
                command = %name,
                player = %player_name,
                error = %e,
                "Chat command denied"
            );
            self.send_player_message(player_name, "You don't have permission to use this command")
                .await;
            return Ok(ChatOutcome::Denied);
        }

        let result = spec
            .handler
            .handle(CommandInvocation {
                player_name: player_name.to_string(),
                player_guid: player_guid.to_string(),
                args,
            })
            .await;

        if let Err(source) = result {
            error!(
                command = %name,
                player = %player_name,
                error = %source,
                "Plugin command handler error"
            );
            self.send_player_message(player_name, "An error occurred while executing the command")
                .await;
            return Err(CommandError::HandlerFailed {
                command: name.to_string(),
                source,
            });
        }

        Ok(ChatOutcome::Executed)
    }

    /// Check the power/permission requirements a spec declares, as gated by
    /// its requirement mode.
    async fn check_requirements(&self, spec: &CommandSpec, player_guid: &str) -> CommandResult<()> {
        let power_gated = spec.min_power > 0
            && matches!(
                spec.requirement,
                RequirementMode::Both | RequirementMode::Power
            );
        let permission_gated = !spec.permissions.is_empty()
            && matches!(
                spec.requirement,
                RequirementMode::Both | RequirementMode::Permission
            );

        if power_gated {
            let power = self.players.power_of(player_guid).await;
            if power < spec.min_power {
                return Err(CommandError::PermissionDenied {
                    command: spec.name.clone(),
                });
            }
        }

        if permission_gated {
            let Some(granted) = self.players.group_permissions_of(player_guid).await else {
                return Err(CommandError::PermissionDenied {
                    command: spec.name.clone(),
                });
            };
            let matched = !granted.is_empty()
                && spec
                    .permissions
                    .iter()
                    .any(|required| granted.contains(required.as_str()));
            if !matched {
                return Err(CommandError::PermissionDenied {
                    command: spec.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Tell a player something through the remote console.
    ///
    /// Delivery failures are logged, never propagated: the chat pipeline
    /// must not fail because a courtesy message did.
    async fn send_player_message(&self, player_name: &str, message: &str) {
        let command = format!("tell {player_name} \"^2{message}\"");
        if let Err(e) = self.console.send(&command).await {
            warn!(player = %player_name, error = %e, "Failed to send player message");
        }
    }

    /// Handler-free snapshots of every registered command, sorted by name.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn registered_commands(&self) -> Vec<CommandInfo> {
        let commands = self.commands.read().expect("lock poisoned");
        let mut infos: Vec<CommandInfo> = commands.values().map(CommandSpec::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Number of registered commands.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.read().expect("lock poisoned").len()
    }
}
