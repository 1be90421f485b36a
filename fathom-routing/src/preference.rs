//! Request-level routing preferences.
//!
//! A [`Preference`] is the flat, tagged form of the iterator policies: one
//! variant per policy, resolved against a table and a node snapshot by a
//! single `match`. Requests carry preferences as strings (`_primary`,
//! `_only_node:xyz`, ...); [`Preference::from_str`] parses that syntax.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use fathom_core::{DiscoveryNodes, NodeId};

use crate::iterator::ShardIterator;
use crate::table::IndexShardRoutingTable;

/// Which shard copies a request should be dispatched to, and in what order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preference {
    /// Round-robin across active copies (the default).
    Random,
    /// Only the primary copy.
    Primary,
    /// Active copies with the primary first.
    PrimaryFirst,
    /// Prefer copies on the local node, falling back to round-robin when
    /// the node snapshot has no local node.
    Local,
    /// Only copies on the given node.
    OnlyNode(NodeId),
    /// Prefer copies on the given node.
    PreferNode(NodeId),
    /// Prefer copies on nodes sharing the given attributes with the local
    /// node.
    PreferAttributes(Vec<String>),
}

impl Preference {
    /// Resolves this preference into an iterator over the table.
    #[must_use]
    pub fn select(
        &self,
        table: &IndexShardRoutingTable,
        nodes: &DiscoveryNodes,
    ) -> ShardIterator {
        match self {
            Self::Random => table.active_shards_random_it(),
            Self::Primary => table.primary_shard_it(),
            Self::PrimaryFirst => table.primary_first_active_shards_it(),
            Self::Local => nodes.local_node_id().map_or_else(
                || table.active_shards_random_it(),
                |local| table.prefer_node_active_shards_it(local),
            ),
            Self::OnlyNode(node_id) => table.only_node_active_shards_it(node_id),
            Self::PreferNode(node_id) => table.prefer_node_active_shards_it(node_id),
            Self::PreferAttributes(attributes) => {
                table.prefer_attributes_active_shards_it(attributes, nodes)
            }
        }
    }
}

/// Errors from parsing a preference string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreferenceParseError {
    /// The string does not name a preference.
    #[error("unrecognized preference: {input}")]
    Unrecognized {
        /// The offending input.
        input: String,
    },

    /// A preference that takes a value was given none.
    #[error("preference '{kind}' requires a value")]
    MissingValue {
        /// The preference missing its value.
        kind: &'static str,
    },
}

impl FromStr for Preference {
    type Err = PreferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "_random" => return Ok(Self::Random),
            "_primary" => return Ok(Self::Primary),
            "_primary_first" => return Ok(Self::PrimaryFirst),
            "_local" => return Ok(Self::Local),
            _ => {}
        }
        if let Some(value) = s.strip_prefix("_only_node:") {
            if value.is_empty() {
                return Err(PreferenceParseError::MissingValue { kind: "_only_node" });
            }
            return Ok(Self::OnlyNode(NodeId::new(value)));
        }
        if let Some(value) = s.strip_prefix("_prefer_node:") {
            if value.is_empty() {
                return Err(PreferenceParseError::MissingValue {
                    kind: "_prefer_node",
                });
            }
            return Ok(Self::PreferNode(NodeId::new(value)));
        }
        if let Some(value) = s.strip_prefix("_prefer_attributes:") {
            let attributes: Vec<String> = value
                .split(',')
                .filter(|attr| !attr.is_empty())
                .map(str::to_string)
                .collect();
            if attributes.is_empty() {
                return Err(PreferenceParseError::MissingValue {
                    kind: "_prefer_attributes",
                });
            }
            return Ok(Self::PreferAttributes(attributes));
        }
        Err(PreferenceParseError::Unrecognized {
            input: s.to_string(),
        })
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => f.write_str("_random"),
            Self::Primary => f.write_str("_primary"),
            Self::PrimaryFirst => f.write_str("_primary_first"),
            Self::Local => f.write_str("_local"),
            Self::OnlyNode(node_id) => write!(f, "_only_node:{node_id}"),
            Self::PreferNode(node_id) => write!(f, "_prefer_node:{node_id}"),
            Self::PreferAttributes(attributes) => {
                write!(f, "_prefer_attributes:{}", attributes.join(","))
            }
        }
    }
}
