//! The change model — immutable descriptions of store mutations
//!
//! Every mutation against the backing store is described by one `Change`
//! value: create a time series, or append numeric/textual chunks to an
//! existing one. Changes are validated at construction, never after; a
//! constructed change is immutable and safe to hand across threads.
//!
//! The variant set is closed. A remote or persisted flusher dispatches on
//! `ChangeTag` to reconstruct the exact variant, so adding a variant means
//! extending the tag space in `wire.rs` as well.

use crate::error::{TideError, TideResult};
use crate::series::{check_version, DataChunk, PointValue, TimeSeriesMetadata};

/// Discriminant identifying a change variant on the wire. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChangeTag {
    /// A new time series was declared on a node
    TimeSeriesCreation = 1,
    /// Numeric chunks appended to an existing series
    DoubleTimeSeriesChunksAddition = 2,
    /// Textual chunks appended to an existing series
    StringTimeSeriesChunksAddition = 3,
}

impl ChangeTag {
    /// Parse a tag from its wire byte.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(ChangeTag::TimeSeriesCreation),
            2 => Some(ChangeTag::DoubleTimeSeriesChunksAddition),
            3 => Some(ChangeTag::StringTimeSeriesChunksAddition),
            _ => None,
        }
    }

    /// Stable external name of the tag.
    pub fn name(&self) -> &'static str {
        match self {
            ChangeTag::TimeSeriesCreation => "TIME_SERIES_CREATION",
            ChangeTag::DoubleTimeSeriesChunksAddition => "DOUBLE_TIME_SERIES_CHUNKS_ADDITION",
            ChangeTag::StringTimeSeriesChunksAddition => "STRING_TIME_SERIES_CHUNKS_ADDITION",
        }
    }
}

fn check_non_empty(field: &'static str, value: &str) -> TideResult<()> {
    if value.is_empty() {
        return Err(TideError::Validation {
            field,
            reason: format!("{} is empty", field),
        });
    }
    Ok(())
}

/// Chunk-append payload, shared by the numeric and textual variants.
///
/// The two variants differ only in the point value type, so one generic
/// struct carries both; `Change` pins the two concrete instantiations.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunksAddition<T> {
    node_id: String,
    version: u64,
    series_name: String,
    chunks: Vec<DataChunk<T>>,
}

impl<T: PointValue> ChunksAddition<T> {
    fn new(
        node_id: String,
        version: u64,
        series_name: String,
        chunks: Vec<DataChunk<T>>,
    ) -> TideResult<Self> {
        check_non_empty("node id", &node_id)?;
        check_non_empty("time series name", &series_name)?;
        check_version(version)?;
        if chunks.is_empty() {
            return Err(TideError::Validation {
                field: "chunks",
                reason: "chunk list is empty".to_string(),
            });
        }
        Ok(Self { node_id, version, series_name, chunks })
    }

    /// Node the series is attached to.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Target version of the series.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Name of the series within the node.
    pub fn series_name(&self) -> &str {
        &self.series_name
    }

    /// The chunks to append, in submission order.
    pub fn chunks(&self) -> &[DataChunk<T>] {
        &self.chunks
    }

    /// Sum of the chunk size estimates.
    pub fn estimated_size(&self) -> u64 {
        self.chunks.iter().map(DataChunk::estimated_size).sum()
    }
}

/// One immutable mutation description against one node.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Declare a new time series on a node
    TimeSeriesCreation {
        /// Node the series is attached to
        node_id: String,
        /// Descriptor of the new series
        metadata: TimeSeriesMetadata,
    },
    /// Append numeric chunks to an existing series
    DoubleChunksAddition(ChunksAddition<f64>),
    /// Append textual chunks to an existing series
    StringChunksAddition(ChunksAddition<String>),
}

impl Change {
    /// Describe the creation of a time series. Fails on an empty node id.
    /// Creation carries no point data, so its estimated size is 0.
    pub fn time_series_creation(
        node_id: impl Into<String>,
        metadata: TimeSeriesMetadata,
    ) -> TideResult<Self> {
        let node_id = node_id.into();
        check_non_empty("node id", &node_id)?;
        Ok(Change::TimeSeriesCreation { node_id, metadata })
    }

    /// Describe the append of numeric chunks. Fails on an empty node id or
    /// series name, an invalid version, or an empty chunk list.
    pub fn double_chunks_addition(
        node_id: impl Into<String>,
        version: u64,
        series_name: impl Into<String>,
        chunks: Vec<DataChunk<f64>>,
    ) -> TideResult<Self> {
        ChunksAddition::new(node_id.into(), version, series_name.into(), chunks)
            .map(Change::DoubleChunksAddition)
    }

    /// Describe the append of textual chunks. Same validation as the
    /// numeric variant.
    pub fn string_chunks_addition(
        node_id: impl Into<String>,
        version: u64,
        series_name: impl Into<String>,
        chunks: Vec<DataChunk<String>>,
    ) -> TideResult<Self> {
        ChunksAddition::new(node_id.into(), version, series_name.into(), chunks)
            .map(Change::StringChunksAddition)
    }

    /// Node this change targets.
    pub fn node_id(&self) -> &str {
        match self {
            Change::TimeSeriesCreation { node_id, .. } => node_id,
            Change::DoubleChunksAddition(addition) => addition.node_id(),
            Change::StringChunksAddition(addition) => addition.node_id(),
        }
    }

    /// Wire discriminant of this change.
    pub fn tag(&self) -> ChangeTag {
        match self {
            Change::TimeSeriesCreation { .. } => ChangeTag::TimeSeriesCreation,
            Change::DoubleChunksAddition(_) => ChangeTag::DoubleTimeSeriesChunksAddition,
            Change::StringChunksAddition(_) => ChangeTag::StringTimeSeriesChunksAddition,
        }
    }

    /// Estimated size cost of this change in bytes, used for the buffer's
    /// size threshold.
    pub fn estimated_size(&self) -> u64 {
        match self {
            Change::TimeSeriesCreation { .. } => 0,
            Change::DoubleChunksAddition(addition) => addition.estimated_size(),
            Change::StringChunksAddition(addition) => addition.estimated_size(),
        }
    }
}
