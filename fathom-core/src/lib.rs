//! Fathom Core - Strongly-typed identifiers and cluster-node view for Fathom.
//!
//! This crate provides the shared vocabulary of the Fathom cluster: shard and
//! node identifiers, the per-node attribute view used by routing preferences,
//! and explicit system limits.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: Prevent mixing up a `NodeId` with an index name
//! - **Explicit limits**: Every decoded quantity has a bounded maximum
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod node;
mod types;

pub use error::{Error, Result};
pub use limits::Limits;
pub use node::{DiscoveryNode, DiscoveryNodes, DiscoveryNodesBuilder};
pub use types::{NodeId, ShardId};
