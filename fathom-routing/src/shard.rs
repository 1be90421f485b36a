//! Shard routing entries - one replica of one shard.
//!
//! A [`ShardRouting`] records where a single copy of a shard lives and what
//! lifecycle state it is in. Entries are immutable values; state transitions
//! are authored by the cluster-state publisher, which replaces whole routing
//! tables rather than mutating entries in place.

use std::fmt;

use fathom_core::{NodeId, ShardId};

/// Lifecycle state of a shard copy.
///
/// Discriminants are the wire encoding; they must not be renumbered.
///
/// ```text
/// UNASSIGNED -> INITIALIZING -> STARTED <-> RELOCATING
///      ^              |
///      +--fail/cancel-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShardRoutingState {
    /// Not allocated to any node.
    Unassigned = 1,
    /// Allocated and recovering on a node; not yet serving reads.
    Initializing = 2,
    /// Fully started and serving.
    Started = 3,
    /// Started, and being moved to another node.
    Relocating = 4,
}

impl ShardRoutingState {
    /// Returns the wire byte for this state.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Decodes a wire byte into a state.
    ///
    /// Returns `None` for bytes that do not name a state.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Unassigned),
            2 => Some(Self::Initializing),
            3 => Some(Self::Started),
            4 => Some(Self::Relocating),
            _ => None,
        }
    }
}

impl fmt::Display for ShardRoutingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unassigned => "UNASSIGNED",
            Self::Initializing => "INITIALIZING",
            Self::Started => "STARTED",
            Self::Relocating => "RELOCATING",
        };
        f.write_str(name)
    }
}

/// One copy (primary or replica) of one shard.
///
/// Equality is structural over all fields; the routing table builder removes
/// entries by equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRouting {
    shard_id: ShardId,
    current_node_id: Option<NodeId>,
    relocating_node_id: Option<NodeId>,
    primary: bool,
    state: ShardRoutingState,
    version: u64,
    allocation_id: Option<String>,
}

impl ShardRouting {
    /// Creates a new routing entry.
    ///
    /// An `Unassigned` entry must not carry a node assignment; that pairing
    /// is a caller bug on this typed path (the wire decoder rejects it as a
    /// decode error instead).
    #[must_use]
    pub fn new(
        shard_id: ShardId,
        current_node_id: Option<NodeId>,
        relocating_node_id: Option<NodeId>,
        primary: bool,
        state: ShardRoutingState,
        version: u64,
    ) -> Self {
        debug_assert!(
            state != ShardRoutingState::Unassigned || current_node_id.is_none(),
            "unassigned shard must not have a node assignment"
        );
        Self {
            shard_id,
            current_node_id,
            relocating_node_id,
            primary,
            state,
            version,
            allocation_id: None,
        }
    }

    /// Attaches an allocation ID, returning the entry for chaining.
    #[must_use]
    pub fn with_allocation_id(mut self, allocation_id: impl Into<String>) -> Self {
        self.allocation_id = Some(allocation_id.into());
        self
    }

    /// Returns a copy of this entry at a different version.
    #[must_use]
    pub fn with_version(&self, version: u64) -> Self {
        let mut copy = self.clone();
        copy.version = version;
        copy
    }

    /// Returns the ID of the shard this entry is a copy of.
    #[inline]
    #[must_use]
    pub const fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    /// Returns the node this copy is assigned to, if any.
    #[inline]
    #[must_use]
    pub const fn current_node_id(&self) -> Option<&NodeId> {
        self.current_node_id.as_ref()
    }

    /// Returns the relocation target node, set while relocating.
    #[inline]
    #[must_use]
    pub const fn relocating_node_id(&self) -> Option<&NodeId> {
        self.relocating_node_id.as_ref()
    }

    /// Returns true if this copy is the primary.
    #[inline]
    #[must_use]
    pub const fn primary(&self) -> bool {
        self.primary
    }

    /// Returns the lifecycle state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ShardRoutingState {
        self.state
    }

    /// Returns the version (epoch) assigned by the cluster-state publisher.
    #[inline]
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Returns the allocation ID, if one was assigned.
    #[must_use]
    pub fn allocation_id(&self) -> Option<&str> {
        self.allocation_id.as_deref()
    }

    /// Returns true if this copy can serve reads (started or relocating).
    #[inline]
    #[must_use]
    pub const fn active(&self) -> bool {
        matches!(
            self.state,
            ShardRoutingState::Started | ShardRoutingState::Relocating
        )
    }

    /// Returns true if this copy is assigned to a node.
    #[inline]
    #[must_use]
    pub const fn assigned_to_node(&self) -> bool {
        self.current_node_id.is_some()
    }

    /// Returns true if this copy is unassigned.
    #[inline]
    #[must_use]
    pub fn unassigned(&self) -> bool {
        self.state == ShardRoutingState::Unassigned
    }

    /// Returns true if this copy is initializing.
    #[inline]
    #[must_use]
    pub fn initializing(&self) -> bool {
        self.state == ShardRoutingState::Initializing
    }

    /// Returns true if this copy is started.
    #[inline]
    #[must_use]
    pub fn started(&self) -> bool {
        self.state == ShardRoutingState::Started
    }

    /// Returns true if this copy is relocating to another node.
    #[inline]
    #[must_use]
    pub fn relocating(&self) -> bool {
        self.state == ShardRoutingState::Relocating
    }

    /// One-line human description, for logs and diagnostics.
    #[must_use]
    pub fn short_summary(&self) -> String {
        use fmt::Write;

        let mut out = String::new();
        let _ = write!(out, "{}", self.shard_id);
        match &self.current_node_id {
            Some(node) => {
                let _ = write!(out, ", node[{node}]");
            }
            None => out.push_str(", unassigned"),
        }
        if let Some(target) = &self.relocating_node_id {
            let _ = write!(out, ", relocating [{target}]");
        }
        out.push_str(if self.primary { ", [P]" } else { ", [R]" });
        let _ = write!(out, ", s[{}]", self.state);
        out
    }
}

impl fmt::Display for ShardRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_primary() -> ShardRouting {
        ShardRouting::new(
            ShardId::new("logs", 0),
            Some(NodeId::new("a")),
            None,
            true,
            ShardRoutingState::Started,
            5,
        )
    }

    #[test]
    fn test_active_states() {
        let shard = started_primary();
        assert!(shard.active());
        assert!(shard.started());
        assert!(!shard.relocating());

        let relocating = ShardRouting::new(
            ShardId::new("logs", 0),
            Some(NodeId::new("a")),
            Some(NodeId::new("b")),
            false,
            ShardRoutingState::Relocating,
            5,
        );
        assert!(relocating.active());
        assert!(relocating.relocating());

        let initializing = ShardRouting::new(
            ShardId::new("logs", 0),
            Some(NodeId::new("a")),
            None,
            false,
            ShardRoutingState::Initializing,
            5,
        );
        assert!(!initializing.active());
        assert!(initializing.assigned_to_node());

        let unassigned = ShardRouting::new(
            ShardId::new("logs", 0),
            None,
            None,
            false,
            ShardRoutingState::Unassigned,
            5,
        );
        assert!(!unassigned.active());
        assert!(!unassigned.assigned_to_node());
        assert!(unassigned.unassigned());
    }

    #[test]
    fn test_state_wire_bytes_round_trip() {
        for state in [
            ShardRoutingState::Unassigned,
            ShardRoutingState::Initializing,
            ShardRoutingState::Started,
            ShardRoutingState::Relocating,
        ] {
            assert_eq!(ShardRoutingState::from_u8(state.value()), Some(state));
        }
        assert_eq!(ShardRoutingState::from_u8(0), None);
        assert_eq!(ShardRoutingState::from_u8(5), None);
    }

    #[test]
    fn test_with_version_changes_only_version() {
        let shard = started_primary().with_allocation_id("alloc-1");
        let bumped = shard.with_version(9);

        assert_eq!(bumped.version(), 9);
        assert_eq!(bumped.shard_id(), shard.shard_id());
        assert_eq!(bumped.current_node_id(), shard.current_node_id());
        assert_eq!(bumped.primary(), shard.primary());
        assert_eq!(bumped.state(), shard.state());
        assert_eq!(bumped.allocation_id(), shard.allocation_id());
        assert_ne!(bumped, shard);
    }

    #[test]
    fn test_equality_is_structural() {
        let a = started_primary();
        let b = started_primary();
        assert_eq!(a, b);
        assert_ne!(a, b.with_version(6));
        assert_ne!(a, b.with_allocation_id("alloc-1"));
    }

    #[test]
    fn test_short_summary() {
        let shard = started_primary();
        assert_eq!(shard.short_summary(), "[logs][0], node[a], [P], s[STARTED]");

        let relocating = ShardRouting::new(
            ShardId::new("logs", 2),
            Some(NodeId::new("a")),
            Some(NodeId::new("b")),
            false,
            ShardRoutingState::Relocating,
            1,
        );
        assert_eq!(
            relocating.short_summary(),
            "[logs][2], node[a], relocating [b], [R], s[RELOCATING]"
        );

        let unassigned = ShardRouting::new(
            ShardId::new("logs", 1),
            None,
            None,
            false,
            ShardRoutingState::Unassigned,
            0,
        );
        assert_eq!(
            unassigned.short_summary(),
            "[logs][1], unassigned, [R], s[UNASSIGNED]"
        );
    }

    #[test]
    #[should_panic(expected = "unassigned shard must not have a node assignment")]
    #[cfg(debug_assertions)]
    fn test_unassigned_with_node_is_a_bug() {
        let _ = ShardRouting::new(
            ShardId::new("logs", 0),
            Some(NodeId::new("a")),
            None,
            false,
            ShardRoutingState::Unassigned,
            0,
        );
    }
}
