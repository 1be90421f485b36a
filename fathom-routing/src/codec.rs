//! Wire codec for routing tables.
//!
//! Routing tables travel inside cluster-state frames. Two encodings exist:
//! the *fat* form carries the index name, the *thin* form omits it and the
//! reader supplies it from the enclosing frame. Both are canonical: the same
//! logical table always produces byte-identical output.
//!
//! # Wire Format (fat)
//!
//! - index name (vint length + UTF-8 bytes)
//! - shard number (vint)
//! - 1 byte: allocated-post-api flag
//! - copy count (vint)
//! - per copy: primary flag byte, optional current node ID, optional
//!   relocating node ID, state byte, version (vlong), optional allocation ID
//!
//! Varints are the 7-bits-per-byte form with the high bit of each byte set
//! when more bytes follow.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tracing::trace;

use fathom_core::{Limits, NodeId, ShardId};

use crate::shard::{ShardRouting, ShardRoutingState};
use crate::table::{IndexShardRoutingTable, IndexShardRoutingTableBuilder};

/// Decode errors.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Insufficient data to decode.
    #[error("insufficient data: need {need} bytes, have {have}")]
    InsufficientData {
        /// Bytes needed.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// A state byte that names no state.
    #[error("invalid shard state: {value}")]
    InvalidState {
        /// The offending byte.
        value: u8,
    },

    /// A varint ran past its maximum width.
    #[error("varint overflow")]
    VarintOverflow,

    /// A string was not valid UTF-8.
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    /// A decoded quantity exceeded its limit.
    #[error("limit exceeded: {what} (max {max}, actual {actual})")]
    LimitExceeded {
        /// Which quantity.
        what: &'static str,
        /// Maximum allowed.
        max: u64,
        /// The decoded value.
        actual: u64,
    },

    /// An unassigned copy carried a node assignment.
    #[error("unassigned shard carries a node assignment")]
    UnassignedWithNode,
}

/// Result type for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Encodes a table in the fat form (index name included).
#[must_use]
pub fn encode_table(table: &IndexShardRoutingTable) -> Bytes {
    let mut buf = BytesMut::with_capacity(64 + table.size() * 48);
    put_string(&mut buf, table.shard_id().index());
    encode_table_thin_into(&mut buf, table);
    buf.freeze()
}

/// Encodes a table in the thin form (index name supplied by the reader).
#[must_use]
pub fn encode_table_thin(table: &IndexShardRoutingTable) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 + table.size() * 48);
    encode_table_thin_into(&mut buf, table);
    buf.freeze()
}

fn encode_table_thin_into(buf: &mut BytesMut, table: &IndexShardRoutingTable) {
    put_vint(buf, table.shard_id().id());
    buf.put_u8(u8::from(table.allocated_post_api()));

    // Safe cast: copy counts are bounded by Limits::max_shard_copies.
    #[allow(clippy::cast_possible_truncation)]
    let size = table.size() as u32;
    put_vint(buf, size);
    for shard in table.shards() {
        encode_shard_routing_thin(buf, shard);
    }
}

/// Decodes a table from the fat form, advancing `buf` past it.
///
/// # Errors
///
/// Returns an error if the bytes are malformed, truncated, or exceed the
/// given limits.
pub fn decode_table(buf: &mut &[u8], limits: &Limits) -> DecodeResult<IndexShardRoutingTable> {
    let index = get_string(buf, limits.max_index_name_bytes, "index name")?;
    decode_table_thin(buf, &index, limits)
}

/// Decodes a table from the thin form, advancing `buf` past it.
///
/// The decoded entries feed the table builder in order, so a duplicate node
/// assignment in the stream is dropped the same way it would be on the
/// typed path.
///
/// # Errors
///
/// Returns an error if the bytes are malformed, truncated, or exceed the
/// given limits.
pub fn decode_table_thin(
    buf: &mut &[u8],
    index: &str,
    limits: &Limits,
) -> DecodeResult<IndexShardRoutingTable> {
    let shard_number = get_vint(buf)?;
    ensure_remaining(buf, 1)?;
    let allocated_post_api = buf.get_u8() != 0;

    let size = get_vint(buf)?;
    if size > limits.max_shard_copies {
        return Err(DecodeError::LimitExceeded {
            what: "shard copies",
            max: u64::from(limits.max_shard_copies),
            actual: u64::from(size),
        });
    }

    let shard_id = ShardId::new(index, shard_number);
    let mut builder = IndexShardRoutingTableBuilder::new(shard_id.clone(), allocated_post_api);
    for _ in 0..size {
        let shard = decode_shard_routing_thin(buf, &shard_id, limits)?;
        builder = builder.add_shard(shard);
    }

    let table = builder.build();
    trace!(shard = %table.shard_id(), copies = table.size(), "decoded routing table");
    Ok(table)
}

/// Encodes one routing entry; the shard ID is implied by the outer frame.
fn encode_shard_routing_thin(buf: &mut BytesMut, shard: &ShardRouting) {
    buf.put_u8(u8::from(shard.primary()));
    put_optional_string(buf, shard.current_node_id().map(NodeId::as_str));
    put_optional_string(buf, shard.relocating_node_id().map(NodeId::as_str));
    buf.put_u8(shard.state().value());
    put_vlong(buf, shard.version());
    put_optional_string(buf, shard.allocation_id());
}

/// Decodes one routing entry under the given shard ID.
fn decode_shard_routing_thin(
    buf: &mut &[u8],
    shard_id: &ShardId,
    limits: &Limits,
) -> DecodeResult<ShardRouting> {
    ensure_remaining(buf, 1)?;
    let primary = buf.get_u8() != 0;
    let current_node_id = get_optional_string(buf, limits.max_node_id_bytes, "node ID")?;
    let relocating_node_id = get_optional_string(buf, limits.max_node_id_bytes, "node ID")?;

    ensure_remaining(buf, 1)?;
    let state_byte = buf.get_u8();
    let state = ShardRoutingState::from_u8(state_byte)
        .ok_or(DecodeError::InvalidState { value: state_byte })?;

    let version = get_vlong(buf)?;
    let allocation_id = get_optional_string(buf, limits.max_node_id_bytes, "allocation ID")?;

    if state == ShardRoutingState::Unassigned && current_node_id.is_some() {
        return Err(DecodeError::UnassignedWithNode);
    }

    let mut shard = ShardRouting::new(
        shard_id.clone(),
        current_node_id.map(NodeId::new),
        relocating_node_id.map(NodeId::new),
        primary,
        state,
        version,
    );
    if let Some(allocation_id) = allocation_id {
        shard = shard.with_allocation_id(allocation_id);
    }
    Ok(shard)
}

fn put_vint(buf: &mut BytesMut, mut value: u32) {
    while value & !0x7F != 0 {
        // Safe cast: masked to the low 7 bits.
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8(((value & 0x7F) | 0x80) as u8);
        value >>= 7;
    }
    // Safe cast: high bits shifted out above.
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u8(value as u8);
}

fn get_vint(buf: &mut &[u8]) -> DecodeResult<u32> {
    let mut result: u32 = 0;
    for shift in [0_u32, 7, 14, 21, 28] {
        ensure_remaining(buf, 1)?;
        let byte = buf.get_u8();
        let payload = u32::from(byte & 0x7F);
        if shift == 28 && payload > 0x0F {
            return Err(DecodeError::VarintOverflow);
        }
        result |= payload << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(DecodeError::VarintOverflow)
}

fn put_vlong(buf: &mut BytesMut, mut value: u64) {
    while value & !0x7F != 0 {
        // Safe cast: masked to the low 7 bits.
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8(((value & 0x7F) | 0x80) as u8);
        value >>= 7;
    }
    // Safe cast: high bits shifted out above.
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u8(value as u8);
}

fn get_vlong(buf: &mut &[u8]) -> DecodeResult<u64> {
    let mut result: u64 = 0;
    for shift in [0_u32, 7, 14, 21, 28, 35, 42, 49, 56, 63] {
        ensure_remaining(buf, 1)?;
        let byte = buf.get_u8();
        let payload = u64::from(byte & 0x7F);
        if shift == 63 && payload > 0x01 {
            return Err(DecodeError::VarintOverflow);
        }
        result |= payload << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(DecodeError::VarintOverflow)
}

fn put_string(buf: &mut BytesMut, value: &str) {
    // Safe cast: string lengths are bounded by Limits on the decode side
    // and by construction on the encode side.
    #[allow(clippy::cast_possible_truncation)]
    let len = value.len() as u32;
    put_vint(buf, len);
    buf.put_slice(value.as_bytes());
}

fn get_string(buf: &mut &[u8], max_bytes: u32, what: &'static str) -> DecodeResult<String> {
    let len = get_vint(buf)?;
    if len > max_bytes {
        return Err(DecodeError::LimitExceeded {
            what,
            max: u64::from(max_bytes),
            actual: u64::from(len),
        });
    }
    let len = len as usize;
    ensure_remaining(buf, len)?;
    let value = std::str::from_utf8(&buf[..len])
        .map_err(|_| DecodeError::InvalidUtf8)?
        .to_string();
    buf.advance(len);
    Ok(value)
}

fn put_optional_string(buf: &mut BytesMut, value: Option<&str>) {
    match value {
        Some(value) => {
            buf.put_u8(1);
            put_string(buf, value);
        }
        None => buf.put_u8(0),
    }
}

fn get_optional_string(
    buf: &mut &[u8],
    max_bytes: u32,
    what: &'static str,
) -> DecodeResult<Option<String>> {
    ensure_remaining(buf, 1)?;
    if buf.get_u8() == 0 {
        return Ok(None);
    }
    get_string(buf, max_bytes, what).map(Some)
}

const fn ensure_remaining(buf: &[u8], need: usize) -> DecodeResult<()> {
    if buf.len() < need {
        return Err(DecodeError::InsufficientData {
            need,
            have: buf.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Limits {
        Limits::new()
    }

    fn shard_id() -> ShardId {
        ShardId::new("logs", 2)
    }

    fn sample_table() -> IndexShardRoutingTable {
        IndexShardRoutingTableBuilder::new(shard_id(), false)
            .add_shard(
                ShardRouting::new(
                    shard_id(),
                    Some(NodeId::new("a")),
                    None,
                    true,
                    ShardRoutingState::Started,
                    5,
                )
                .with_allocation_id("alloc-a"),
            )
            .add_shard(ShardRouting::new(
                shard_id(),
                Some(NodeId::new("b")),
                Some(NodeId::new("c")),
                false,
                ShardRoutingState::Relocating,
                5,
            ))
            .add_shard(ShardRouting::new(
                shard_id(),
                None,
                None,
                false,
                ShardRoutingState::Unassigned,
                3,
            ))
            .build()
    }

    fn assert_tables_equal(a: &IndexShardRoutingTable, b: &IndexShardRoutingTable) {
        assert_eq!(a.shard_id(), b.shard_id());
        assert_eq!(a.allocated_post_api(), b.allocated_post_api());
        assert_eq!(a.shards(), b.shards());
    }

    #[test]
    fn test_vint_round_trip() {
        for value in [0_u32, 1, 127, 128, 300, 16_383, 16_384, 1 << 21, u32::MAX] {
            let mut buf = BytesMut::new();
            put_vint(&mut buf, value);
            let mut slice: &[u8] = &buf;
            assert_eq!(get_vint(&mut slice).unwrap(), value);
            assert!(slice.is_empty(), "value {value} left trailing bytes");
        }
    }

    #[test]
    fn test_vint_single_byte_boundary() {
        let mut buf = BytesMut::new();
        put_vint(&mut buf, 127);
        assert_eq!(buf.as_ref(), &[0x7F]);

        let mut buf = BytesMut::new();
        put_vint(&mut buf, 128);
        assert_eq!(buf.as_ref(), &[0x80, 0x01]);
    }

    #[test]
    fn test_vint_overflow() {
        // Six continuation bytes never fit a u32.
        let data = [0xFF_u8, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let mut slice: &[u8] = &data;
        assert!(matches!(
            get_vint(&mut slice),
            Err(DecodeError::VarintOverflow)
        ));
    }

    #[test]
    fn test_vint_truncated() {
        let data = [0x80_u8];
        let mut slice: &[u8] = &data;
        assert!(matches!(
            get_vint(&mut slice),
            Err(DecodeError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_vlong_round_trip() {
        for value in [0_u64, 1, 127, 128, 1 << 35, u64::from(u32::MAX), u64::MAX] {
            let mut buf = BytesMut::new();
            put_vlong(&mut buf, value);
            let mut slice: &[u8] = &buf;
            assert_eq!(get_vlong(&mut slice).unwrap(), value);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn test_string_round_trip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "logs-2024");
        put_optional_string(&mut buf, None);
        put_optional_string(&mut buf, Some("node-1"));

        let mut slice: &[u8] = &buf;
        assert_eq!(get_string(&mut slice, 64, "test").unwrap(), "logs-2024");
        assert_eq!(get_optional_string(&mut slice, 64, "test").unwrap(), None);
        assert_eq!(
            get_optional_string(&mut slice, 64, "test").unwrap(),
            Some("node-1".to_string())
        );
    }

    #[test]
    fn test_string_length_limit() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "an-index-name-that-is-rather-long");
        let mut slice: &[u8] = &buf;
        assert!(matches!(
            get_string(&mut slice, 8, "index name"),
            Err(DecodeError::LimitExceeded {
                what: "index name",
                ..
            })
        ));
    }

    #[test]
    fn test_string_invalid_utf8() {
        let mut buf = BytesMut::new();
        put_vint(&mut buf, 2);
        buf.put_slice(&[0xC0, 0x00]);
        let mut slice: &[u8] = &buf;
        assert!(matches!(
            get_string(&mut slice, 64, "test"),
            Err(DecodeError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_fat_round_trip() {
        let table = sample_table();
        let encoded = encode_table(&table);

        let mut slice: &[u8] = &encoded;
        let decoded = decode_table(&mut slice, &limits()).unwrap();

        assert!(slice.is_empty());
        assert_tables_equal(&table, &decoded);
    }

    #[test]
    fn test_thin_round_trip() {
        let table = sample_table();
        let encoded = encode_table_thin(&table);

        let mut slice: &[u8] = &encoded;
        let decoded = decode_table_thin(&mut slice, "logs", &limits()).unwrap();

        assert!(slice.is_empty());
        assert_tables_equal(&table, &decoded);
    }

    #[test]
    fn test_encoding_is_canonical() {
        let table = sample_table();
        let first = encode_table(&table);

        let mut slice: &[u8] = &first;
        let decoded = decode_table(&mut slice, &limits()).unwrap();
        let second = encode_table(&decoded);

        assert_eq!(first, second);
    }

    #[test]
    fn test_fat_is_thin_plus_index_name() {
        let table = sample_table();
        let fat = encode_table(&table);
        let thin = encode_table_thin(&table);

        assert!(fat.len() > thin.len());
        assert_eq!(&fat[fat.len() - thin.len()..], thin.as_ref());
    }

    #[test]
    fn test_decode_truncated_table() {
        let table = sample_table();
        let encoded = encode_table(&table);

        for cut in [0, 1, encoded.len() / 2, encoded.len() - 1] {
            let mut slice = &encoded[..cut];
            assert!(
                decode_table(&mut slice, &limits()).is_err(),
                "cut at {cut} should fail"
            );
        }
    }

    #[test]
    fn test_decode_invalid_state_byte() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "logs");
        put_vint(&mut buf, 0);
        buf.put_u8(0);
        put_vint(&mut buf, 1);
        // Entry: replica, no nodes, state byte 9.
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u8(9);

        let mut slice: &[u8] = &buf;
        assert!(matches!(
            decode_table(&mut slice, &limits()),
            Err(DecodeError::InvalidState { value: 9 })
        ));
    }

    #[test]
    fn test_decode_unassigned_with_node_rejected() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "logs");
        put_vint(&mut buf, 0);
        buf.put_u8(0);
        put_vint(&mut buf, 1);
        // Entry: replica on node "a" claiming UNASSIGNED.
        buf.put_u8(0);
        put_optional_string(&mut buf, Some("a"));
        put_optional_string(&mut buf, None);
        buf.put_u8(ShardRoutingState::Unassigned.value());
        put_vlong(&mut buf, 0);
        put_optional_string(&mut buf, None);

        let mut slice: &[u8] = &buf;
        assert!(matches!(
            decode_table(&mut slice, &limits()),
            Err(DecodeError::UnassignedWithNode)
        ));
    }

    #[test]
    fn test_decode_copy_count_limit() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "logs");
        put_vint(&mut buf, 0);
        buf.put_u8(0);
        put_vint(&mut buf, limits().max_shard_copies + 1);

        let mut slice: &[u8] = &buf;
        assert!(matches!(
            decode_table(&mut slice, &limits()),
            Err(DecodeError::LimitExceeded {
                what: "shard copies",
                ..
            })
        ));
    }

    #[test]
    fn test_decode_applies_duplicate_assignment_rule() {
        // Hand-build a frame with two copies on the same node; the builder
        // keeps only the first.
        let mut buf = BytesMut::new();
        put_string(&mut buf, "logs");
        put_vint(&mut buf, 0);
        buf.put_u8(1);
        put_vint(&mut buf, 2);
        for primary in [1_u8, 0] {
            buf.put_u8(primary);
            put_optional_string(&mut buf, Some("a"));
            put_optional_string(&mut buf, None);
            buf.put_u8(ShardRoutingState::Started.value());
            put_vlong(&mut buf, 1);
            put_optional_string(&mut buf, None);
        }

        let mut slice: &[u8] = &buf;
        let table = decode_table(&mut slice, &limits()).unwrap();
        assert_eq!(table.size(), 1);
        assert!(table.shards()[0].primary());
    }

    #[test]
    fn test_empty_table_round_trip() {
        let table = IndexShardRoutingTableBuilder::new(ShardId::new("empty", 0), false).build();
        let encoded = encode_table(&table);

        let mut slice: &[u8] = &encoded;
        let decoded = decode_table(&mut slice, &limits()).unwrap();

        assert_eq!(decoded.size(), 0);
        assert!(!decoded.allocated_post_api());
        assert!(decoded.primary_shard().is_none());
    }
}
