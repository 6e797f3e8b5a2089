//! Time-series value types consumed by the change model
//!
//! These types describe the data being buffered, not the store holding it:
//! a metadata descriptor for newly created series, a regular time index,
//! and the data chunks appended to existing series. The buffering core only
//! needs their identity and an estimated size cost; actual point semantics
//! live in the backing store.

use hashbrown::HashMap;

use crate::error::{TideError, TideResult};

/// First valid version number of a time series. Version 0 means
/// "no version assigned" and is rejected at change construction.
pub const FIRST_VERSION: u64 = 1;

/// Check that a time-series version number is valid.
pub fn check_version(version: u64) -> TideResult<()> {
    if version < FIRST_VERSION {
        return Err(TideError::Validation {
            field: "version",
            reason: format!("version must be >= {}, got {}", FIRST_VERSION, version),
        });
    }
    Ok(())
}

/// Point value type of a time series. Closed set: the wire tag space and
/// the chunk variants both depend on it staying closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TimeSeriesDataType {
    /// 64-bit floating point values
    Double = 1,
    /// UTF-8 string values
    String = 2,
}

impl TimeSeriesDataType {
    /// Parse a data type from its wire byte.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(TimeSeriesDataType::Double),
            2 => Some(TimeSeriesDataType::String),
            _ => None,
        }
    }
}

/// Regular time index: evenly spaced points over a closed interval.
/// All values are milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeIndex {
    start_time: i64,
    end_time: i64,
    spacing: i64,
}

impl TimeIndex {
    /// Create a regular index. Fails if the interval is inverted or the
    /// spacing is not positive.
    pub fn new(start_time: i64, end_time: i64, spacing: i64) -> TideResult<Self> {
        if spacing <= 0 {
            return Err(TideError::Validation {
                field: "spacing",
                reason: format!("spacing must be > 0, got {}", spacing),
            });
        }
        if end_time < start_time {
            return Err(TideError::Validation {
                field: "end_time",
                reason: format!("end time {} is before start time {}", end_time, start_time),
            });
        }
        // point_count computes end - start; a span wider than i64 would overflow
        if end_time.checked_sub(start_time).is_none() {
            return Err(TideError::Validation {
                field: "end_time",
                reason: format!(
                    "interval [{}, {}] spans more than {} milliseconds",
                    start_time,
                    end_time,
                    i64::MAX
                ),
            });
        }
        Ok(Self { start_time, end_time, spacing })
    }

    /// Start of the interval (ms since epoch).
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// End of the interval (ms since epoch).
    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    /// Spacing between points (ms).
    pub fn spacing(&self) -> i64 {
        self.spacing
    }

    /// Number of points the index spans.
    pub fn point_count(&self) -> u64 {
        ((self.end_time - self.start_time) / self.spacing) as u64 + 1
    }
}

/// Descriptor of a time series: name, point type, free-form tags, and the
/// time index the points are laid out on.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesMetadata {
    name: String,
    data_type: TimeSeriesDataType,
    tags: HashMap<String, String>,
    index: TimeIndex,
}

impl TimeSeriesMetadata {
    /// Create a metadata descriptor with no tags. Fails on an empty name.
    pub fn new(name: impl Into<String>, data_type: TimeSeriesDataType, index: TimeIndex) -> TideResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(TideError::Validation {
                field: "name",
                reason: "time series name is empty".to_string(),
            });
        }
        Ok(Self {
            name,
            data_type,
            tags: HashMap::new(),
            index,
        })
    }

    /// Attach a tag, returning the descriptor for chaining.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Series name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Point value type.
    pub fn data_type(&self) -> TimeSeriesDataType {
        self.data_type
    }

    /// Free-form tags.
    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    /// Time index of the series.
    pub fn index(&self) -> &TimeIndex {
        &self.index
    }
}

/// Point value that knows its estimated storage cost in bytes.
///
/// The cost feeds the buffer's size threshold; it is an estimate, not an
/// exact encoded size.
pub trait PointValue {
    /// Estimated storage cost of this value in bytes.
    fn estimated_size(&self) -> u64;
}

impl PointValue for f64 {
    fn estimated_size(&self) -> u64 {
        std::mem::size_of::<f64>() as u64
    }
}

impl PointValue for String {
    fn estimated_size(&self) -> u64 {
        self.len() as u64
    }
}

/// A contiguous run of point values starting at a point offset within the
/// series index. One chunk is the unit producers submit data in.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChunk<T> {
    offset: u64,
    values: Vec<T>,
}

impl<T: PointValue> DataChunk<T> {
    /// Create a chunk. Fails if `values` is empty.
    pub fn new(offset: u64, values: Vec<T>) -> TideResult<Self> {
        if values.is_empty() {
            return Err(TideError::Validation {
                field: "values",
                reason: "chunk has no values".to_string(),
            });
        }
        Ok(Self { offset, values })
    }

    /// Point offset of the first value within the series index.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The point values, in index order.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Number of points in the chunk.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// A constructed chunk is never empty; kept for API completeness.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Estimated storage cost of the chunk in bytes.
    pub fn estimated_size(&self) -> u64 {
        self.values.iter().map(PointValue::estimated_size).sum()
    }
}
