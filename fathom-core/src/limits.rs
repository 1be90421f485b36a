//! System limits for routing structures.
//!
//! Put limits on everything: every decoded length and count has an explicit
//! maximum, so a malformed or hostile cluster-state frame cannot drive
//! unbounded allocation.

/// Limits applied when decoding routing structures from the wire.
///
/// Defaults are generous for real clusters while keeping decode allocation
/// bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of copies (primary + replicas) of a single shard.
    pub max_shard_copies: u32,
    /// Maximum byte length of an index name.
    pub max_index_name_bytes: u32,
    /// Maximum byte length of a node or allocation ID.
    pub max_node_id_bytes: u32,
    /// Maximum number of attribute names in a preference key.
    pub max_attribute_count: u32,
}

impl Limits {
    /// Creates limits with safe defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_shard_copies: 128,
            max_index_name_bytes: 256,
            max_node_id_bytes: 128,
            max_attribute_count: 16,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limit is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_shard_copies == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_shard_copies",
                reason: "must be positive",
            });
        }
        if self.max_index_name_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_index_name_bytes",
                reason: "must be positive",
            });
        }
        if self.max_node_id_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_node_id_bytes",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
