//! Player lookup collaborator trait.

use async_trait::async_trait;

/// Resolves a caller's effective power level and group permissions.
///
/// Backed by the panel's persistence layer outside this workspace. Lookups
/// are keyed by the player's stable GUID, not the display name chat lines
/// carry.
#[async_trait]
pub trait PlayerDirectory: Send + Sync {
    /// Effective power level for a player. Unknown players are level zero.
    async fn power_of(&self, guid: &str) -> u32;

    /// The serialized permission list of the player's group, or `None` if
    /// the player is unknown or has no group.
    ///
    /// The list is kept in its serialized form because command permission
    /// matching is substring containment against it.
    async fn group_permissions_of(&self, guid: &str) -> Option<String>;
}

impl std::fmt::Debug for dyn PlayerDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerDirectory").finish_non_exhaustive()
    }
}
