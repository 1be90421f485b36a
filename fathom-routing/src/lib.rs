//! Fathom Routing - Shard routing table and request-dispatch iterators.
//!
//! This crate holds the in-memory data structure that describes where each
//! shard copy of each index lives across the cluster, together with the
//! family of deterministic-but-randomized iterators that translate a client
//! request into an ordered list of shard copies to try.
//!
//! # Design
//!
//! - **Observational immutability**: a built [`IndexShardRoutingTable`] is
//!   never mutated; readers on any thread need no synchronization
//! - **Randomized starts**: a per-table atomic counter spreads successive
//!   requests across shard copies
//! - **Published attribute cache**: attribute groupings are computed once
//!   and published via an atomic pointer swap
//! - **Explicit limits**: every decoded quantity is bounded

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod codec;
mod iterator;
mod preference;
mod shard;
mod table;

pub use codec::{
    decode_table, decode_table_thin, encode_table, encode_table_thin, DecodeError, DecodeResult,
};
pub use iterator::ShardIterator;
pub use preference::{Preference, PreferenceParseError};
pub use shard::{ShardRouting, ShardRoutingState};
pub use table::{IndexShardRoutingTable, IndexShardRoutingTableBuilder};
