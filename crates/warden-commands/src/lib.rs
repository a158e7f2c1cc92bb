//! Warden Commands - Chat command surface for the Warden plugin runtime.
//!
//! Plugins contribute chat-style commands (`!hello`, `!kick <player>` ...)
//! through a [`CommandSurface`]. Incoming chat lines are dispatched through
//! [`CommandSurface::process_chat`], which validates argument counts and
//! the caller's power level and group permissions before invoking the
//! handler; rejected calls are answered in-game through the
//! [`RemoteConsole`] rather than surfaced as errors.
//!
//! The two collaborator traits are implemented outside this workspace:
//!
//! - [`RemoteConsole`] wraps the game server's control-protocol (RCON)
//!   client and is also handed to plugins as an opaque capability.
//! - [`PlayerDirectory`] resolves a player's effective power level and
//!   group permissions from the panel's persistence layer.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod command;
mod console;
mod error;
mod player;
mod surface;

pub use command::{
    CommandHandler, CommandInfo, CommandInvocation, CommandSpec, FnCommandHandler, RequirementMode,
};
pub use console::RemoteConsole;
pub use error::{BoxError, CommandError, CommandResult};
pub use player::PlayerDirectory;
pub use surface::{ChatOutcome, CommandSurface};
