//! Cluster-node view consumed by routing preferences.
//!
//! `DiscoveryNodes` is an immutable snapshot of the nodes known to the
//! cluster, keyed by node ID, with one node optionally designated as local.
//! Routing only reads node attributes from it; membership changes are
//! published by replacing the whole snapshot.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::NodeId;

/// A single node in the cluster, as seen by routing.
///
/// Attributes are free-form string pairs assigned in node configuration
/// (e.g. `rack` or `zone`). An absent attribute is distinct from an
/// empty-string value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryNode {
    id: NodeId,
    name: String,
    attributes: HashMap<String, String>,
}

impl DiscoveryNode {
    /// Creates a new node with no attributes.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            attributes: HashMap::new(),
        }
    }

    /// Adds an attribute, returning the node for chaining.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Returns the node ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> &NodeId {
        &self.id
    }

    /// Returns the human-readable node name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of the named attribute, if present.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Immutable snapshot of all nodes in the cluster.
///
/// At most one node is designated local (the node this process runs on).
/// A snapshot without a local node is legal: client-side views route
/// without locality preferences.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryNodes {
    nodes: HashMap<NodeId, DiscoveryNode>,
    local_node_id: Option<NodeId>,
}

impl DiscoveryNodes {
    /// Returns a builder for a new snapshot.
    #[must_use]
    pub fn builder() -> DiscoveryNodesBuilder {
        DiscoveryNodesBuilder::default()
    }

    /// Returns the node with the given ID, if known.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&DiscoveryNode> {
        self.nodes.get(id)
    }

    /// Returns the node with the given ID.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the node is not in this snapshot.
    pub fn require(&self, id: &NodeId) -> Result<&DiscoveryNode> {
        self.nodes.get(id).ok_or_else(|| Error::NotFound {
            resource: "node",
            id: id.as_str().to_string(),
        })
    }

    /// Returns true if a node with the given ID is in this snapshot.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Returns the local node, if one is designated.
    #[must_use]
    pub fn local_node(&self) -> Option<&DiscoveryNode> {
        self.local_node_id.as_ref().and_then(|id| self.nodes.get(id))
    }

    /// Returns the local node's ID, if one is designated.
    #[must_use]
    pub const fn local_node_id(&self) -> Option<&NodeId> {
        self.local_node_id.as_ref()
    }

    /// Returns the number of nodes in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the snapshot has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builder for a `DiscoveryNodes` snapshot.
#[derive(Debug, Default)]
pub struct DiscoveryNodesBuilder {
    nodes: HashMap<NodeId, DiscoveryNode>,
    local_node_id: Option<NodeId>,
}

impl DiscoveryNodesBuilder {
    /// Adds a node, replacing any previous node with the same ID.
    #[must_use]
    pub fn add(mut self, node: DiscoveryNode) -> Self {
        self.nodes.insert(node.id().clone(), node);
        self
    }

    /// Designates the local node.
    #[must_use]
    pub fn local_node_id(mut self, id: impl Into<NodeId>) -> Self {
        self.local_node_id = Some(id.into());
        self
    }

    /// Builds the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if a local node was designated but
    /// no node with that ID was added.
    pub fn build(self) -> Result<DiscoveryNodes> {
        if let Some(local) = &self.local_node_id {
            if !self.nodes.contains_key(local) {
                return Err(Error::InvalidArgument {
                    name: "local_node_id",
                    reason: "not present in nodes",
                });
            }
        }
        Ok(DiscoveryNodes {
            nodes: self.nodes,
            local_node_id: self.local_node_id,
        })
    }
}
