//! Binary wire encoding of changes and change sets
//!
//! A remote or persisted flusher must be able to reconstruct the exact
//! change variant, so every change is encoded behind one discriminating
//! tag byte from the closed `ChangeTag` set. All integers are little
//! endian.
//!
//! Layout per change:
//!   tag(u8) + variant payload
//!
//! TIME_SERIES_CREATION payload:
//!   node_id(str16) + name(str16) + data_type(u8)
//!   + start_time(i64) + end_time(i64) + spacing(i64)
//!   + tag_count(u32) + tag_count * (key(str16) + value(str16))
//!
//! *_TIME_SERIES_CHUNKS_ADDITION payload:
//!   node_id(str16) + version(u64) + series_name(str16)
//!   + chunk_count(u32) + chunk_count * chunk
//!   chunk: offset(u64) + value_count(u32) + values
//!   values: f64 bits (double) or str32 (string)
//!
//! str16/str32 are length-prefixed UTF-8 (u16/u32 length). Metadata tags
//! are written sorted by key so encoding is deterministic.
//!
//! A change set is count(u32) + the encoded changes in append order.

use crate::change::{Change, ChangeTag, ChunksAddition};
use crate::changeset::ChangeSet;
use crate::error::{TideError, TideResult};
use crate::series::{DataChunk, TimeIndex, TimeSeriesDataType, TimeSeriesMetadata};

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn write_str16(out: &mut Vec<u8>, field: &'static str, value: &str) -> TideResult<()> {
    if value.len() > u16::MAX as usize {
        return Err(TideError::Validation {
            field,
            reason: format!("{} bytes exceeds the {}-byte wire limit", value.len(), u16::MAX),
        });
    }
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn write_str32(out: &mut Vec<u8>, field: &'static str, value: &str) -> TideResult<()> {
    if value.len() > u32::MAX as usize {
        return Err(TideError::Validation {
            field,
            reason: format!("{} bytes exceeds the {}-byte wire limit", value.len(), u32::MAX),
        });
    }
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn write_metadata(out: &mut Vec<u8>, metadata: &TimeSeriesMetadata) -> TideResult<()> {
    write_str16(out, "time series name", metadata.name())?;
    out.push(metadata.data_type() as u8);

    let index = metadata.index();
    out.extend_from_slice(&index.start_time().to_le_bytes());
    out.extend_from_slice(&index.end_time().to_le_bytes());
    out.extend_from_slice(&index.spacing().to_le_bytes());

    // Sorted by key: hash map iteration order must not leak into the encoding
    let mut tags: Vec<(&String, &String)> = metadata.tags().iter().collect();
    tags.sort_by_key(|(key, _)| *key);

    out.extend_from_slice(&(tags.len() as u32).to_le_bytes());
    for (key, value) in tags {
        write_str16(out, "tag key", key)?;
        write_str16(out, "tag value", value)?;
    }
    Ok(())
}

fn write_addition_header<T>(out: &mut Vec<u8>, addition: &ChunksAddition<T>) -> TideResult<()>
where
    T: crate::series::PointValue,
{
    write_str16(out, "node id", addition.node_id())?;
    out.extend_from_slice(&addition.version().to_le_bytes());
    write_str16(out, "time series name", addition.series_name())?;
    out.extend_from_slice(&(addition.chunks().len() as u32).to_le_bytes());
    Ok(())
}

/// Encode one change, tag byte first.
pub fn encode_change(change: &Change, out: &mut Vec<u8>) -> TideResult<()> {
    out.push(change.tag() as u8);
    match change {
        Change::TimeSeriesCreation { node_id, metadata } => {
            write_str16(out, "node id", node_id)?;
            write_metadata(out, metadata)?;
        }
        Change::DoubleChunksAddition(addition) => {
            write_addition_header(out, addition)?;
            for chunk in addition.chunks() {
                out.extend_from_slice(&chunk.offset().to_le_bytes());
                out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
                for value in chunk.values() {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        Change::StringChunksAddition(addition) => {
            write_addition_header(out, addition)?;
            for chunk in addition.chunks() {
                out.extend_from_slice(&chunk.offset().to_le_bytes());
                out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
                for value in chunk.values() {
                    write_str32(out, "point value", value)?;
                }
            }
        }
    }
    Ok(())
}

/// Encode a whole change set: count prefix plus the changes in append order.
pub fn encode_change_set(change_set: &ChangeSet) -> TideResult<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&(change_set.len() as u32).to_le_bytes());
    for change in change_set.changes() {
        encode_change(change, &mut out)?;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Byte reader tracking its offset for error context.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn truncated(&self, need: usize) -> TideError {
        TideError::Corrupted {
            path: None,
            offset: self.pos as u64,
            reason: format!("need {} more bytes, {} available", need, self.remaining()),
        }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Validate a declared element count against the bytes left in the
    /// input before any allocation sized by it. Each element needs at
    /// least `min_element_size` encoded bytes, so a count the remaining
    /// input cannot possibly hold is corruption, not a reason to reserve
    /// gigabytes.
    fn check_count(&self, count: u32, min_element_size: usize) -> TideResult<()> {
        let need = count as u64 * min_element_size as u64;
        if need > self.remaining() as u64 {
            return Err(TideError::Corrupted {
                path: None,
                offset: self.pos as u64,
                reason: format!(
                    "declared count {} needs at least {} bytes, {} available",
                    count,
                    need,
                    self.remaining()
                ),
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> TideResult<&'a [u8]> {
        if self.data.len() - self.pos < len {
            return Err(self.truncated(len));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> TideResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> TideResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> TideResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> TideResult<u64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("slice length checked");
        Ok(u64::from_le_bytes(bytes))
    }

    fn read_i64(&mut self) -> TideResult<i64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("slice length checked");
        Ok(i64::from_le_bytes(bytes))
    }

    fn read_f64(&mut self) -> TideResult<f64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("slice length checked");
        Ok(f64::from_le_bytes(bytes))
    }

    fn read_str(&mut self, len: usize) -> TideResult<String> {
        let start = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| TideError::Corrupted {
            path: None,
            offset: start as u64,
            reason: format!("invalid UTF-8 string: {}", e),
        })
    }

    fn read_str16(&mut self) -> TideResult<String> {
        let len = self.read_u16()? as usize;
        self.read_str(len)
    }

    fn read_str32(&mut self) -> TideResult<String> {
        let len = self.read_u32()? as usize;
        self.read_str(len)
    }

    fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }
}

fn read_metadata(cursor: &mut Cursor<'_>) -> TideResult<TimeSeriesMetadata> {
    let name = cursor.read_str16()?;

    let type_offset = cursor.pos;
    let type_byte = cursor.read_u8()?;
    let data_type = TimeSeriesDataType::from_wire(type_byte).ok_or_else(|| TideError::Corrupted {
        path: None,
        offset: type_offset as u64,
        reason: format!("unknown data type byte 0x{:02x}", type_byte),
    })?;

    let start_time = cursor.read_i64()?;
    let end_time = cursor.read_i64()?;
    let spacing = cursor.read_i64()?;
    let index = TimeIndex::new(start_time, end_time, spacing)?;

    let mut metadata = TimeSeriesMetadata::new(name, data_type, index)?;
    let tag_count = cursor.read_u32()?;
    for _ in 0..tag_count {
        let key = cursor.read_str16()?;
        let value = cursor.read_str16()?;
        metadata = metadata.with_tag(key, value);
    }
    Ok(metadata)
}

// Minimum encoded sizes used to sanity-check declared counts: a chunk is
// at least its offset(u64) + value_count(u32); a double value is 8 bytes;
// a string value is at least its u32 length prefix.
const MIN_CHUNK_SIZE: usize = 8 + 4;
const MIN_DOUBLE_SIZE: usize = 8;
const MIN_STRING_SIZE: usize = 4;

fn read_double_chunks(cursor: &mut Cursor<'_>) -> TideResult<Vec<DataChunk<f64>>> {
    let chunk_count = cursor.read_u32()?;
    cursor.check_count(chunk_count, MIN_CHUNK_SIZE)?;
    let mut chunks = Vec::with_capacity(chunk_count as usize);
    for _ in 0..chunk_count {
        let offset = cursor.read_u64()?;
        let value_count = cursor.read_u32()?;
        cursor.check_count(value_count, MIN_DOUBLE_SIZE)?;
        let mut values = Vec::with_capacity(value_count as usize);
        for _ in 0..value_count {
            values.push(cursor.read_f64()?);
        }
        chunks.push(DataChunk::new(offset, values)?);
    }
    Ok(chunks)
}

fn read_string_chunks(cursor: &mut Cursor<'_>) -> TideResult<Vec<DataChunk<String>>> {
    let chunk_count = cursor.read_u32()?;
    cursor.check_count(chunk_count, MIN_CHUNK_SIZE)?;
    let mut chunks = Vec::with_capacity(chunk_count as usize);
    for _ in 0..chunk_count {
        let offset = cursor.read_u64()?;
        let value_count = cursor.read_u32()?;
        cursor.check_count(value_count, MIN_STRING_SIZE)?;
        let mut values = Vec::with_capacity(value_count as usize);
        for _ in 0..value_count {
            values.push(cursor.read_str32()?);
        }
        chunks.push(DataChunk::new(offset, values)?);
    }
    Ok(chunks)
}

fn read_change(cursor: &mut Cursor<'_>) -> TideResult<Change> {
    let tag_offset = cursor.pos;
    let tag_byte = cursor.read_u8()?;
    let tag = ChangeTag::from_wire(tag_byte).ok_or(TideError::UnknownChangeTag {
        tag: tag_byte,
        offset: tag_offset as u64,
    })?;

    match tag {
        ChangeTag::TimeSeriesCreation => {
            let node_id = cursor.read_str16()?;
            let metadata = read_metadata(cursor)?;
            Change::time_series_creation(node_id, metadata)
        }
        ChangeTag::DoubleTimeSeriesChunksAddition => {
            let node_id = cursor.read_str16()?;
            let version = cursor.read_u64()?;
            let series_name = cursor.read_str16()?;
            let chunks = read_double_chunks(cursor)?;
            Change::double_chunks_addition(node_id, version, series_name, chunks)
        }
        ChangeTag::StringTimeSeriesChunksAddition => {
            let node_id = cursor.read_str16()?;
            let version = cursor.read_u64()?;
            let series_name = cursor.read_str16()?;
            let chunks = read_string_chunks(cursor)?;
            Change::string_chunks_addition(node_id, version, series_name, chunks)
        }
    }
}

/// Decode one change from the start of `data`. Fails if trailing bytes
/// remain.
pub fn decode_change(data: &[u8]) -> TideResult<Change> {
    let mut cursor = Cursor::new(data);
    let change = read_change(&mut cursor)?;
    if !cursor.is_at_end() {
        return Err(TideError::Corrupted {
            path: None,
            offset: cursor.pos as u64,
            reason: format!("{} trailing bytes after change", data.len() - cursor.pos),
        });
    }
    Ok(change)
}

/// Decode a whole change set. Order is the original append order.
pub fn decode_change_set(data: &[u8]) -> TideResult<ChangeSet> {
    let mut cursor = Cursor::new(data);
    let count = cursor.read_u32()?;

    let mut change_set = ChangeSet::new();
    for _ in 0..count {
        change_set.append(read_change(&mut cursor)?);
    }
    if !cursor.is_at_end() {
        return Err(TideError::Corrupted {
            path: None,
            offset: cursor.pos as u64,
            reason: format!("{} trailing bytes after change set", data.len() - cursor.pos),
        });
    }
    Ok(change_set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> TimeSeriesMetadata {
        let index = TimeIndex::new(0, 86_400_000, 3_600_000).unwrap();
        TimeSeriesMetadata::new("load", TimeSeriesDataType::Double, index)
            .unwrap()
            .with_tag("unit", "MW")
            .with_tag("source", "scada")
    }

    #[test]
    fn test_creation_roundtrip() {
        let change = Change::time_series_creation("node1", metadata()).unwrap();

        let mut encoded = Vec::new();
        encode_change(&change, &mut encoded).unwrap();
        let decoded = decode_change(&encoded).unwrap();

        assert_eq!(decoded, change);
    }

    #[test]
    fn test_double_addition_roundtrip() {
        let chunks = vec![
            DataChunk::new(0, vec![1.5, -2.5, f64::MAX]).unwrap(),
            DataChunk::new(100, vec![0.0]).unwrap(),
        ];
        let change = Change::double_chunks_addition("node1", 3, "load", chunks).unwrap();

        let mut encoded = Vec::new();
        encode_change(&change, &mut encoded).unwrap();
        assert_eq!(decode_change(&encoded).unwrap(), change);
    }

    #[test]
    fn test_string_addition_roundtrip() {
        let chunks = vec![DataChunk::new(7, vec!["on".to_string(), "öff".to_string()]).unwrap()];
        let change = Change::string_chunks_addition("node1", 1, "switch", chunks).unwrap();

        let mut encoded = Vec::new();
        encode_change(&change, &mut encoded).unwrap();
        assert_eq!(decode_change(&encoded).unwrap(), change);
    }

    #[test]
    fn test_tag_byte_is_first() {
        let change = Change::time_series_creation("node1", metadata()).unwrap();
        let mut encoded = Vec::new();
        encode_change(&change, &mut encoded).unwrap();
        assert_eq!(encoded[0], ChangeTag::TimeSeriesCreation as u8);
    }

    #[test]
    fn test_encoding_deterministic_despite_tag_map() {
        // Same tags inserted in different orders must encode identically.
        let index = TimeIndex::new(0, 1000, 100).unwrap();
        let a = TimeSeriesMetadata::new("ts", TimeSeriesDataType::Double, index)
            .unwrap()
            .with_tag("unit", "MW")
            .with_tag("source", "scada");
        let b = TimeSeriesMetadata::new("ts", TimeSeriesDataType::Double, index)
            .unwrap()
            .with_tag("source", "scada")
            .with_tag("unit", "MW");

        let mut encoded_a = Vec::new();
        encode_change(&Change::time_series_creation("n", a).unwrap(), &mut encoded_a).unwrap();
        let mut encoded_b = Vec::new();
        encode_change(&Change::time_series_creation("n", b).unwrap(), &mut encoded_b).unwrap();
        assert_eq!(encoded_a, encoded_b);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let change = Change::time_series_creation("node1", metadata()).unwrap();
        let mut encoded = Vec::new();
        encode_change(&change, &mut encoded).unwrap();
        encoded[0] = 0x7F;
        assert!(matches!(
            decode_change(&encoded),
            Err(TideError::UnknownChangeTag { tag: 0x7F, offset: 0 })
        ));
    }

    #[test]
    fn test_truncated_change_rejected() {
        let change = Change::double_chunks_addition(
            "node1", 1, "ts", vec![DataChunk::new(0, vec![1.0, 2.0]).unwrap()],
        ).unwrap();
        let mut encoded = Vec::new();
        encode_change(&change, &mut encoded).unwrap();

        encoded.truncate(encoded.len() - 3);
        assert!(matches!(decode_change(&encoded), Err(TideError::Corrupted { .. })));
    }

    #[test]
    fn test_huge_declared_chunk_count_rejected() {
        // A tiny input declaring u32::MAX chunks must fail as corrupted,
        // not attempt a matching preallocation.
        let mut encoded = vec![ChangeTag::DoubleTimeSeriesChunksAddition as u8];
        write_str16(&mut encoded, "node id", "n").unwrap();
        encoded.extend_from_slice(&1u64.to_le_bytes()); // version
        write_str16(&mut encoded, "time series name", "ts").unwrap();
        encoded.extend_from_slice(&u32::MAX.to_le_bytes()); // chunk_count

        assert!(matches!(decode_change(&encoded), Err(TideError::Corrupted { .. })));
    }

    #[test]
    fn test_huge_declared_value_count_rejected() {
        let mut encoded = vec![ChangeTag::StringTimeSeriesChunksAddition as u8];
        write_str16(&mut encoded, "node id", "n").unwrap();
        encoded.extend_from_slice(&1u64.to_le_bytes()); // version
        write_str16(&mut encoded, "time series name", "ts").unwrap();
        encoded.extend_from_slice(&1u32.to_le_bytes()); // chunk_count
        encoded.extend_from_slice(&0u64.to_le_bytes()); // chunk offset
        encoded.extend_from_slice(&u32::MAX.to_le_bytes()); // value_count

        assert!(matches!(decode_change(&encoded), Err(TideError::Corrupted { .. })));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut encoded = vec![ChangeTag::TimeSeriesCreation as u8];
        encoded.extend_from_slice(&2u16.to_le_bytes()); // node id length
        encoded.extend_from_slice(&[0xFF, 0xFE]); // not UTF-8

        let err = decode_change(&encoded).unwrap_err();
        match err {
            TideError::Corrupted { reason, .. } => assert!(reason.contains("UTF-8")),
            other => panic!("Expected Corrupted, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let change = Change::time_series_creation("node1", metadata()).unwrap();
        let mut encoded = Vec::new();
        encode_change(&change, &mut encoded).unwrap();
        encoded.push(0xAA);
        assert!(matches!(decode_change(&encoded), Err(TideError::Corrupted { .. })));
    }

    #[test]
    fn test_change_set_roundtrip_preserves_order() {
        let mut change_set = ChangeSet::new();
        change_set.append(Change::time_series_creation("a", metadata()).unwrap());
        change_set.append(
            Change::double_chunks_addition(
                "b", 2, "load", vec![DataChunk::new(4, vec![7.0]).unwrap()],
            ).unwrap(),
        );
        change_set.append(
            Change::string_chunks_addition(
                "c", 1, "switch", vec![DataChunk::new(0, vec!["x".to_string()]).unwrap()],
            ).unwrap(),
        );

        let encoded = encode_change_set(&change_set).unwrap();
        let decoded = decode_change_set(&encoded).unwrap();

        assert_eq!(decoded, change_set);
        let node_ids: Vec<&str> = decoded.changes().iter().map(Change::node_id).collect();
        assert_eq!(node_ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_empty_change_set_roundtrip() {
        let encoded = encode_change_set(&ChangeSet::new()).unwrap();
        assert_eq!(encoded, 0u32.to_le_bytes());
        let decoded = decode_change_set(&encoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_decoded_size_matches_original() {
        let chunks = vec![DataChunk::new(0, vec![1.0; 10]).unwrap()];
        let change = Change::double_chunks_addition("n", 1, "ts", chunks).unwrap();
        let mut change_set = ChangeSet::new();
        change_set.append(change);

        let decoded = decode_change_set(&encode_change_set(&change_set).unwrap()).unwrap();
        assert_eq!(decoded.estimated_size(), change_set.estimated_size());
    }
}
