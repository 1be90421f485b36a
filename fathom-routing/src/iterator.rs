//! Single-pass cursors over an ordered list of shard copies.
//!
//! A [`ShardIterator`] owns its materialized ordering, so it stays valid
//! after the routing table that produced it is dropped. Restart is not
//! supported; callers needing a fresh ordering ask the table for a new
//! iterator.

use fathom_core::ShardId;

use crate::shard::ShardRouting;

/// An ordered, single-pass cursor over shard copies to try.
#[derive(Debug, Clone)]
pub struct ShardIterator {
    shard_id: ShardId,
    shards: Vec<ShardRouting>,
    index: usize,
}

impl ShardIterator {
    /// Creates an iterator over the given ordering.
    #[must_use]
    pub const fn new(shard_id: ShardId, shards: Vec<ShardRouting>) -> Self {
        Self {
            shard_id,
            shards,
            index: 0,
        }
    }

    /// Returns the ID of the shard this iterator dispatches for.
    #[inline]
    #[must_use]
    pub const fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    /// Returns the total number of copies in this ordering.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shards.len()
    }

    /// Returns the number of copies not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.shards.len() - self.index
    }

    /// Returns true if the ordering has no copies at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Advances the cursor, returning the next copy to try.
    ///
    /// Returns `None` once all copies have been consumed.
    pub fn next_or_none(&mut self) -> Option<&ShardRouting> {
        let shard = self.shards.get(self.index)?;
        self.index += 1;
        Some(shard)
    }
}

impl IntoIterator for ShardIterator {
    type Item = ShardRouting;
    type IntoIter = std::iter::Skip<std::vec::IntoIter<ShardRouting>>;

    /// Consumes the cursor, yielding the copies not yet consumed.
    fn into_iter(self) -> Self::IntoIter {
        self.shards.into_iter().skip(self.index)
    }
}
