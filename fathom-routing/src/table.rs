//! The per-shard routing table and its iterator-selection policies.
//!
//! An [`IndexShardRoutingTable`] groups every copy of one shard and is
//! observationally immutable after build: the only internal mutation is the
//! round-robin counter and the lazily published attribute-group cache,
//! neither of which is visible through the accessor surface. Replacement is
//! by whole-object swap when a new cluster state is published.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rand::Rng;
use tracing::trace;

use fathom_core::{DiscoveryNodes, NodeId, ShardId};

use crate::iterator::ShardIterator;
use crate::shard::{ShardRouting, ShardRoutingState};

/// Cache key for attribute groupings: the ordered tuple of attribute names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AttributesKey {
    attributes: Vec<String>,
}

/// Active shards partitioned against the local node's attribute values.
///
/// The two lists are disjoint and preserve `active_shards` order. Frozen on
/// first computation and shared through the cache thereafter.
#[derive(Debug)]
struct AttributesRoutings {
    with_same_attribute: Vec<ShardRouting>,
    without_same_attribute: Vec<ShardRouting>,
    total_size: usize,
}

impl AttributesRoutings {
    fn new(with_same_attribute: Vec<ShardRouting>, without_same_attribute: Vec<ShardRouting>) -> Self {
        let total_size = with_same_attribute.len() + without_same_attribute.len();
        Self {
            with_same_attribute,
            without_same_attribute,
            total_size,
        }
    }
}

type AttributesCache = HashMap<AttributesKey, Arc<AttributesRoutings>>;

/// All copies of one shard, with precomputed partitions and iterator policies.
///
/// Built once by [`IndexShardRoutingTableBuilder`]; safe for unbounded
/// concurrent readers without synchronization.
#[derive(Debug)]
pub struct IndexShardRoutingTable {
    shard_id: ShardId,
    shards: Vec<ShardRouting>,
    primary: Option<ShardRouting>,
    primary_as_list: Vec<ShardRouting>,
    replicas: Vec<ShardRouting>,
    active_shards: Vec<ShardRouting>,
    assigned_shards: Vec<ShardRouting>,
    allocated_post_api: bool,
    /// Drives randomized iterator starts. Wraps; consumers take the
    /// absolute value before modulo.
    counter: AtomicI32,
    /// Published attribute groupings; replaced whole on insert.
    active_shards_by_attributes: ArcSwap<AttributesCache>,
    shards_by_attribute_mutex: Mutex<()>,
}

impl IndexShardRoutingTable {
    fn new(shard_id: ShardId, shards: Vec<ShardRouting>, allocated_post_api: bool) -> Self {
        let seed = if shards.is_empty() {
            0
        } else {
            // Safe cast: shard copy counts are far below i32::MAX.
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let len = shards.len() as i32;
            rand::thread_rng().gen_range(0..len)
        };

        let mut primary = None;
        let mut replicas = Vec::new();
        let mut active_shards = Vec::new();
        let mut assigned_shards = Vec::new();

        for shard in &shards {
            if shard.primary() {
                primary = Some(shard.clone());
            } else {
                replicas.push(shard.clone());
            }
            if shard.active() {
                active_shards.push(shard.clone());
            }
            if shard.assigned_to_node() {
                assigned_shards.push(shard.clone());
            }
        }

        let primary_as_list = primary.iter().cloned().collect();

        Self {
            shard_id,
            shards,
            primary,
            primary_as_list,
            replicas,
            active_shards,
            assigned_shards,
            allocated_post_api,
            counter: AtomicI32::new(seed),
            active_shards_by_attributes: ArcSwap::from_pointee(AttributesCache::new()),
            shards_by_attribute_mutex: Mutex::new(()),
        }
    }

    /// Returns the ID of the shard this table describes.
    #[inline]
    #[must_use]
    pub const fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    /// Returns the number of copies in the table.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shards.len()
    }

    /// Returns all copies, in builder insertion order.
    #[must_use]
    pub fn shards(&self) -> &[ShardRouting] {
        &self.shards
    }

    /// Returns the primary copy, if one is present.
    #[must_use]
    pub const fn primary_shard(&self) -> Option<&ShardRouting> {
        self.primary.as_ref()
    }

    /// Returns the non-primary copies, order preserved.
    #[must_use]
    pub fn replica_shards(&self) -> &[ShardRouting] {
        &self.replicas
    }

    /// Returns the copies that can serve reads, order preserved.
    #[must_use]
    pub fn active_shards(&self) -> &[ShardRouting] {
        &self.active_shards
    }

    /// Returns the copies assigned to a node, order preserved.
    #[must_use]
    pub fn assigned_shards(&self) -> &[ShardRouting] {
        &self.assigned_shards
    }

    /// Whether any primary of this shard group has been active since the
    /// index was created through the API. Sticky once true.
    #[inline]
    #[must_use]
    pub const fn allocated_post_api(&self) -> bool {
        self.allocated_post_api
    }

    /// Counts copies in the given state.
    #[must_use]
    pub fn count_with_state(&self, state: ShardRoutingState) -> usize {
        self.shards.iter().filter(|s| s.state() == state).count()
    }

    /// Returns copies whose state is any of the given states.
    #[must_use]
    pub fn shards_with_state(&self, states: &[ShardRoutingState]) -> Vec<ShardRouting> {
        let mut found = Vec::new();
        for shard in &self.shards {
            for state in states {
                if shard.state() == *state {
                    found.push(shard.clone());
                }
            }
        }
        found
    }

    /// Raises every copy to the highest version present in the group.
    ///
    /// Returns the same table (same `Arc`) when the group has at most one
    /// copy or all versions already agree; otherwise builds a fresh table
    /// with version-bumped clones of the stale entries. Used after merging
    /// partial updates so readers observe one consistent epoch.
    #[must_use]
    pub fn normalize_versions(self: &Arc<Self>) -> Arc<Self> {
        if self.shards.len() <= 1 {
            return Arc::clone(self);
        }

        let mut highest = self.shards[0].version();
        let mut requires_normalization = false;
        for shard in &self.shards[1..] {
            if shard.version() != highest {
                requires_normalization = true;
            }
            if shard.version() > highest {
                highest = shard.version();
            }
        }
        if !requires_normalization {
            return Arc::clone(self);
        }

        let normalized = self
            .shards
            .iter()
            .map(|shard| {
                if shard.version() == highest {
                    shard.clone()
                } else {
                    shard.with_version(highest)
                }
            })
            .collect();
        Arc::new(Self::new(
            self.shard_id.clone(),
            normalized,
            self.allocated_post_api,
        ))
    }

    fn next_counter(&self) -> i32 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    fn rotated_it(&self, seq: &[ShardRouting], index: i32) -> ShardIterator {
        ShardIterator::new(self.shard_id.clone(), rotated(seq, index))
    }

    /// All copies, insertion order.
    #[must_use]
    pub fn shards_it(&self) -> ShardIterator {
        ShardIterator::new(self.shard_id.clone(), self.shards.clone())
    }

    /// All copies, rotated by the counter.
    #[must_use]
    pub fn shards_random_it(&self) -> ShardIterator {
        self.rotated_it(&self.shards, self.next_counter())
    }

    /// All copies, rotated by an explicit index.
    #[must_use]
    pub fn shards_it_at(&self, index: i32) -> ShardIterator {
        self.rotated_it(&self.shards, index)
    }

    /// Active copies, insertion order.
    #[must_use]
    pub fn active_shards_it(&self) -> ShardIterator {
        ShardIterator::new(self.shard_id.clone(), self.active_shards.clone())
    }

    /// Active copies, rotated by the counter.
    #[must_use]
    pub fn active_shards_random_it(&self) -> ShardIterator {
        self.rotated_it(&self.active_shards, self.next_counter())
    }

    /// Active copies, rotated by an explicit index.
    #[must_use]
    pub fn active_shards_it_at(&self, index: i32) -> ShardIterator {
        self.rotated_it(&self.active_shards, index)
    }

    /// Assigned copies, insertion order.
    #[must_use]
    pub fn assigned_shards_it(&self) -> ShardIterator {
        ShardIterator::new(self.shard_id.clone(), self.assigned_shards.clone())
    }

    /// Assigned copies, rotated by the counter.
    #[must_use]
    pub fn assigned_shards_random_it(&self) -> ShardIterator {
        self.rotated_it(&self.assigned_shards, self.next_counter())
    }

    /// Assigned copies, rotated by an explicit index.
    #[must_use]
    pub fn assigned_shards_it_at(&self, index: i32) -> ShardIterator {
        self.rotated_it(&self.assigned_shards, index)
    }

    /// The primary copy alone, or an empty iterator if there is none.
    #[must_use]
    pub fn primary_shard_it(&self) -> ShardIterator {
        ShardIterator::new(self.shard_id.clone(), self.primary_as_list.clone())
    }

    /// Active copies in counter-rotated order, with the primary swapped to
    /// the front when it is active.
    #[must_use]
    pub fn primary_first_active_shards_it(&self) -> ShardIterator {
        let ordered = fill_with_swap(&self.active_shards, self.next_counter(), ShardRouting::primary);
        ShardIterator::new(self.shard_id.clone(), ordered)
    }

    /// All copies, preferring execution on the given node if a copy lives
    /// there.
    #[must_use]
    pub fn prefer_node_shards_it(&self, node_id: &NodeId) -> ShardIterator {
        self.prefer_node_it(node_id, &self.shards)
    }

    /// Active copies, preferring execution on the given node.
    #[must_use]
    pub fn prefer_node_active_shards_it(&self, node_id: &NodeId) -> ShardIterator {
        self.prefer_node_it(node_id, &self.active_shards)
    }

    /// Assigned copies, preferring execution on the given node.
    #[must_use]
    pub fn prefer_node_assigned_shards_it(&self, node_id: &NodeId) -> ShardIterator {
        self.prefer_node_it(node_id, &self.assigned_shards)
    }

    fn prefer_node_it(&self, node_id: &NodeId, seq: &[ShardRouting]) -> ShardIterator {
        let ordered = fill_with_swap(seq, self.next_counter(), |shard| {
            shard.current_node_id() == Some(node_id)
        });
        ShardIterator::new(self.shard_id.clone(), ordered)
    }

    /// Only the copies living on the given node, insertion order.
    ///
    /// Filters over all copies, not just active ones; an initializing copy
    /// on the node is included.
    #[must_use]
    pub fn only_node_active_shards_it(&self, node_id: &NodeId) -> ShardIterator {
        let ordered = self
            .shards
            .iter()
            .filter(|shard| shard.current_node_id() == Some(node_id))
            .cloned()
            .collect();
        ShardIterator::new(self.shard_id.clone(), ordered)
    }

    /// Active copies grouped by shared node attributes, counter-rotated.
    ///
    /// Copies whose node agrees with the local node on any of the given
    /// attributes come first; the two groups are rotated independently and
    /// never interleaved.
    #[must_use]
    pub fn prefer_attributes_active_shards_it(
        &self,
        attributes: &[String],
        nodes: &DiscoveryNodes,
    ) -> ShardIterator {
        let index = self.next_counter().wrapping_add(1);
        self.prefer_attributes_active_shards_it_at(attributes, nodes, index)
    }

    /// Active copies grouped by shared node attributes, rotated by an
    /// explicit index.
    #[must_use]
    pub fn prefer_attributes_active_shards_it_at(
        &self,
        attributes: &[String],
        nodes: &DiscoveryNodes,
        index: i32,
    ) -> ShardIterator {
        let routings = self.attribute_routings(attributes, nodes);
        let mut ordered = Vec::with_capacity(routings.total_size);
        ordered.extend(rotated(&routings.with_same_attribute, index));
        ordered.extend(rotated(&routings.without_same_attribute, index));
        ShardIterator::new(self.shard_id.clone(), ordered)
    }

    /// Returns the cached grouping for the attribute names, computing and
    /// publishing it on first use.
    ///
    /// Keyed by attribute names only; a table is rebuilt (and the cache with
    /// it) whenever node attribute values can have changed.
    fn attribute_routings(
        &self,
        attributes: &[String],
        nodes: &DiscoveryNodes,
    ) -> Arc<AttributesRoutings> {
        let key = AttributesKey {
            attributes: attributes.to_vec(),
        };
        if let Some(found) = self.active_shards_by_attributes.load().get(&key) {
            return Arc::clone(found);
        }

        let _guard = self.shards_by_attribute_mutex.lock();
        // Another writer may have published while we waited for the lock.
        let current = self.active_shards_by_attributes.load_full();
        if let Some(found) = current.get(&key) {
            return Arc::clone(found);
        }

        trace!(
            shard = %self.shard_id,
            ?attributes,
            "computing attribute grouping for active shards"
        );

        let mut from = self.active_shards.clone();
        let mut to = Vec::new();
        if let Some(local) = nodes.local_node() {
            for attribute in attributes {
                let Some(local_value) = local.attribute(attribute) else {
                    continue;
                };
                let mut i = 0;
                while i < from.len() {
                    let same = from[i]
                        .current_node_id()
                        .and_then(|node_id| nodes.get(node_id))
                        .and_then(|node| node.attribute(attribute))
                        == Some(local_value);
                    if same {
                        to.push(from.remove(i));
                    } else {
                        i += 1;
                    }
                }
            }
        }

        let routings = Arc::new(AttributesRoutings::new(to, from));
        let mut next: AttributesCache = (*current).clone();
        next.insert(key, Arc::clone(&routings));
        self.active_shards_by_attributes.store(Arc::new(next));
        routings
    }
}

/// Materializes `rot(seq, index)` with the index taken absolute.
fn rotated(seq: &[ShardRouting], index: i32) -> Vec<ShardRouting> {
    if seq.is_empty() {
        return Vec::new();
    }
    // Safe cast: u32 fits usize on supported targets.
    #[allow(clippy::cast_possible_truncation)]
    let start = index.unsigned_abs() as usize % seq.len();
    let mut ordered = Vec::with_capacity(seq.len());
    ordered.extend_from_slice(&seq[start..]);
    ordered.extend_from_slice(&seq[..start]);
    ordered
}

/// Fills a counter-rotated ordering, swapping the first matching copy to the
/// front as it is encountered.
fn fill_with_swap(
    seq: &[ShardRouting],
    index: i32,
    matches: impl Fn(&ShardRouting) -> bool,
) -> Vec<ShardRouting> {
    let mut ordered = Vec::with_capacity(seq.len());
    if seq.is_empty() {
        return ordered;
    }
    // Safe cast: u32 fits usize on supported targets.
    #[allow(clippy::cast_possible_truncation)]
    let start = index.unsigned_abs() as usize;
    for i in 0..seq.len() {
        let loc = (start + i) % seq.len();
        let shard = &seq[loc];
        let hit = matches(shard);
        ordered.push(shard.clone());
        if hit {
            ordered.swap(0, i);
        }
    }
    ordered
}

/// Incremental constructor for [`IndexShardRoutingTable`].
///
/// Open until [`build`](Self::build); duplicate node assignments are dropped
/// silently (a node never holds two copies of the same shard).
#[derive(Debug)]
pub struct IndexShardRoutingTableBuilder {
    shard_id: ShardId,
    shards: Vec<ShardRouting>,
    allocated_post_api: bool,
}

impl IndexShardRoutingTableBuilder {
    /// Starts an empty builder for the given shard.
    #[must_use]
    pub const fn new(shard_id: ShardId, allocated_post_api: bool) -> Self {
        Self {
            shard_id,
            shards: Vec::new(),
            allocated_post_api,
        }
    }

    /// Re-opens an existing table for incremental update.
    #[must_use]
    pub fn from_table(table: &IndexShardRoutingTable) -> Self {
        Self {
            shard_id: table.shard_id.clone(),
            shards: table.shards.clone(),
            allocated_post_api: table.allocated_post_api,
        }
    }

    /// Appends a copy, unless a copy is already assigned to the same node.
    #[must_use]
    pub fn add_shard(mut self, entry: ShardRouting) -> Self {
        for shard in &self.shards {
            // A node never holds primary and replica of the same shard.
            if shard.assigned_to_node()
                && entry.assigned_to_node()
                && shard.current_node_id() == entry.current_node_id()
            {
                return self;
            }
        }
        self.shards.push(entry);
        self
    }

    /// Removes a copy by structural equality.
    #[must_use]
    pub fn remove_shard(mut self, entry: &ShardRouting) -> Self {
        if let Some(pos) = self.shards.iter().position(|shard| shard == entry) {
            self.shards.remove(pos);
        }
        self
    }

    /// Freezes the builder into a table.
    ///
    /// Promotes `allocated_post_api` to true when any primary copy is
    /// active, keeping the flag sticky across table lineages.
    #[must_use]
    pub fn build(mut self) -> IndexShardRoutingTable {
        if !self.allocated_post_api {
            for shard in &self.shards {
                if shard.primary() && shard.active() {
                    self.allocated_post_api = true;
                }
            }
        }
        IndexShardRoutingTable::new(self.shard_id, self.shards, self.allocated_post_api)
    }
}
