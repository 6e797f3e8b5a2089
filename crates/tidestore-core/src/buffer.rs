//! ChangeBuffer — the concurrency core
//!
//! Producers call mutation methods; each call constructs a validated
//! `Change`, appends it to the pending `ChangeSet`, and checks the flush
//! thresholds. A batch that reaches either threshold is handed to the
//! `Flusher` inline, on the producer's own thread.
//!
//! The buffer is a strict monitor: one mutex serializes every operation
//! that touches the pending set, including the flusher call itself. No
//! background or deferred flush exists, so changes always reach the
//! flusher in exact append order and no flush runs concurrently with
//! another flush or append.
//!
//! FLUSH CONTRACT: the pending set is taken out of the buffer BEFORE the
//! flusher runs. Whatever the flusher returns, the buffer is empty
//! afterwards; a flush failure surfaces to whichever caller triggered it
//! and the batch is not retried. A producer that only appended one small
//! change can therefore see a flush error caused by the whole batch.

use parking_lot::Mutex;

use crate::change::Change;
use crate::changeset::ChangeSet;
use crate::config::BufferConfig;
use crate::error::TideResult;
use crate::series::{DataChunk, TimeSeriesMetadata};

/// External collaborator that durably applies a batch of changes to the
/// real store, in submission order.
///
/// The sole seam between the buffering core and the persistence engine.
/// Errors propagate verbatim through the buffer; the buffer never
/// retries, inspects, or partially rolls back a failed batch.
pub trait Flusher: Send + Sync {
    /// Apply every change in the set to the backing store.
    fn flush(&self, change_set: &ChangeSet) -> TideResult<()>;
}

impl<F> Flusher for F
where
    F: Fn(&ChangeSet) -> TideResult<()> + Send + Sync,
{
    fn flush(&self, change_set: &ChangeSet) -> TideResult<()> {
        self(change_set)
    }
}

/// Accumulates change descriptions and hands full batches to a `Flusher`.
///
/// All public methods take `&self`; the pending set lives behind one
/// mutex that is held for the whole append/check/flush path.
pub struct ChangeBuffer<F: Flusher> {
    /// Changes accumulated since the last flush — only touched under the lock
    pending: Mutex<ChangeSet>,
    flusher: F,
    max_change_count: usize,
    max_estimated_size: u64,
}

impl<F: Flusher> ChangeBuffer<F> {
    /// Create a buffer with explicit thresholds. Fails with a
    /// configuration error if either threshold is 0.
    pub fn new(flusher: F, max_change_count: usize, max_estimated_size: u64) -> TideResult<Self> {
        BufferConfig::new(max_change_count, max_estimated_size).validate()?;
        Ok(Self {
            pending: Mutex::new(ChangeSet::new()),
            flusher,
            max_change_count,
            max_estimated_size,
        })
    }

    /// Create a buffer from a validated configuration.
    pub fn with_config(flusher: F, config: BufferConfig) -> TideResult<Self> {
        Self::new(flusher, config.max_change_count, config.max_estimated_size)
    }

    /// Buffer the creation of a time series on a node.
    ///
    /// May flush inline if the append crosses a threshold; the flush
    /// error, if any, surfaces here.
    pub fn create_time_series(
        &self,
        node_id: impl Into<String>,
        metadata: TimeSeriesMetadata,
    ) -> TideResult<()> {
        let change = Change::time_series_creation(node_id, metadata)?;
        self.append(change)
    }

    /// Buffer the append of numeric chunks to an existing series.
    ///
    /// Validation failures (empty chunk list, bad version, empty names)
    /// are returned before the buffer is touched.
    pub fn add_double_time_series_data(
        &self,
        node_id: impl Into<String>,
        version: u64,
        series_name: impl Into<String>,
        chunks: Vec<DataChunk<f64>>,
    ) -> TideResult<()> {
        let change = Change::double_chunks_addition(node_id, version, series_name, chunks)?;
        self.append(change)
    }

    /// Buffer the append of textual chunks to an existing series.
    pub fn add_string_time_series_data(
        &self,
        node_id: impl Into<String>,
        version: u64,
        series_name: impl Into<String>,
        chunks: Vec<DataChunk<String>>,
    ) -> TideResult<()> {
        let change = Change::string_chunks_addition(node_id, version, series_name, chunks)?;
        self.append(change)
    }

    /// True iff no changes are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Number of pending changes.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Estimated size of the pending batch in bytes.
    pub fn pending_size(&self) -> u64 {
        self.pending.lock().estimated_size()
    }

    /// Force a flush, invoking the flusher even if the pending set is
    /// empty. The buffer is empty after this returns, success or failure.
    pub fn flush(&self) -> TideResult<()> {
        let mut pending = self.pending.lock();
        self.flush_locked(&mut pending)
    }

    /// Append under the lock, then run the threshold check.
    fn append(&self, change: Change) -> TideResult<()> {
        let mut pending = self.pending.lock();
        pending.append(change);
        if pending.len() >= self.max_change_count
            || pending.estimated_size() >= self.max_estimated_size
        {
            self.flush_locked(&mut pending)?;
        }
        Ok(())
    }

    /// Hand the pending batch to the flusher. Taking the set out first
    /// means the buffer is reset on every exit path, including a flusher
    /// error.
    fn flush_locked(&self, pending: &mut ChangeSet) -> TideResult<()> {
        let batch = std::mem::take(pending);
        self.flusher.flush(&batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeTag;
    use crate::error::TideError;
    use crate::series::{TimeIndex, TimeSeriesDataType};
    use parking_lot::Mutex as PlMutex;
    use std::sync::Arc;

    /// Records every batch handed to it, in order.
    #[derive(Default)]
    struct RecordingFlusher {
        batches: PlMutex<Vec<ChangeSet>>,
    }

    impl RecordingFlusher {
        fn batch_count(&self) -> usize {
            self.batches.lock().len()
        }

        fn batch(&self, i: usize) -> ChangeSet {
            self.batches.lock()[i].clone()
        }
    }

    impl Flusher for RecordingFlusher {
        fn flush(&self, change_set: &ChangeSet) -> TideResult<()> {
            self.batches.lock().push(change_set.clone());
            Ok(())
        }
    }

    /// Fails every flush after recording that it was invoked.
    #[derive(Default)]
    struct FailingFlusher {
        calls: PlMutex<usize>,
    }

    impl Flusher for FailingFlusher {
        fn flush(&self, _change_set: &ChangeSet) -> TideResult<()> {
            *self.calls.lock() += 1;
            Err(TideError::Io {
                path: None,
                kind: std::io::ErrorKind::BrokenPipe,
                message: "store unreachable".to_string(),
            })
        }
    }

    fn metadata(name: &str) -> TimeSeriesMetadata {
        let index = TimeIndex::new(0, 1000, 100).unwrap();
        TimeSeriesMetadata::new(name, TimeSeriesDataType::Double, index).unwrap()
    }

    fn double_chunk(values: Vec<f64>) -> Vec<DataChunk<f64>> {
        vec![DataChunk::new(0, values).unwrap()]
    }

    #[test]
    fn test_zero_thresholds_rejected() {
        assert!(matches!(
            ChangeBuffer::new(RecordingFlusher::default(), 0, 1024),
            Err(TideError::Configuration { .. })
        ));
        assert!(matches!(
            ChangeBuffer::new(RecordingFlusher::default(), 10, 0),
            Err(TideError::Configuration { .. })
        ));
    }

    #[test]
    fn test_with_config_defaults() {
        let buffer =
            ChangeBuffer::with_config(RecordingFlusher::default(), BufferConfig::default())
                .unwrap();

        buffer.create_time_series("node1", metadata("ts")).unwrap();
        assert!(!buffer.is_empty());
        assert_eq!(buffer.flusher.batch_count(), 0);
    }

    #[test]
    fn test_below_thresholds_no_flush() {
        let buffer = ChangeBuffer::new(RecordingFlusher::default(), 100, 1000).unwrap();

        buffer.create_time_series("node1", metadata("ts")).unwrap();
        buffer.add_double_time_series_data("node1", 1, "ts", double_chunk(vec![1.0])).unwrap();

        assert!(!buffer.is_empty());
        assert_eq!(buffer.pending_count(), 2);
        assert_eq!(buffer.pending_size(), 8);
        assert_eq!(buffer.flusher.batch_count(), 0);
    }

    #[test]
    fn test_count_threshold_triggers_single_flush() {
        // Scenario: max 2 changes, generous size limit
        let buffer = ChangeBuffer::new(RecordingFlusher::default(), 2, 1000).unwrap();

        buffer.create_time_series("node1", metadata("ts")).unwrap();
        assert!(!buffer.is_empty());
        assert_eq!(buffer.flusher.batch_count(), 0);

        buffer
            .add_double_time_series_data("node1", 1, "ts", double_chunk(vec![1.0; 6]))
            .unwrap();

        assert!(buffer.is_empty());
        assert_eq!(buffer.flusher.batch_count(), 1);

        let batch = buffer.flusher.batch(0);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.changes()[0].tag(), ChangeTag::TimeSeriesCreation);
        assert_eq!(batch.changes()[1].tag(), ChangeTag::DoubleTimeSeriesChunksAddition);
    }

    #[test]
    fn test_size_threshold_triggers_flush() {
        // Scenario: generous count limit, 100-byte size limit; a single
        // 152-byte addition flushes immediately.
        let buffer = ChangeBuffer::new(RecordingFlusher::default(), 100, 100).unwrap();

        buffer
            .add_double_time_series_data("node1", 1, "ts", double_chunk(vec![0.5; 19]))
            .unwrap();

        assert!(buffer.is_empty());
        assert_eq!(buffer.flusher.batch_count(), 1);
        assert_eq!(buffer.flusher.batch(0).len(), 1);
        assert_eq!(buffer.flusher.batch(0).estimated_size(), 152);
    }

    #[test]
    fn test_explicit_flush_even_when_empty() {
        let buffer = ChangeBuffer::new(RecordingFlusher::default(), 100, 1000).unwrap();

        buffer.flush().unwrap();

        assert_eq!(buffer.flusher.batch_count(), 1);
        assert!(buffer.flusher.batch(0).is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_explicit_flush_drains_pending() {
        let buffer = ChangeBuffer::new(RecordingFlusher::default(), 100, 1000).unwrap();

        buffer.create_time_series("node1", metadata("ts")).unwrap();
        buffer.flush().unwrap();

        assert!(buffer.is_empty());
        assert_eq!(buffer.pending_size(), 0);
        assert_eq!(buffer.flusher.batch_count(), 1);
        assert_eq!(buffer.flusher.batch(0).len(), 1);
    }

    #[test]
    fn test_order_preserved_across_flush() {
        let buffer = ChangeBuffer::new(RecordingFlusher::default(), 3, 10_000).unwrap();

        buffer.create_time_series("a", metadata("ts")).unwrap();
        buffer.create_time_series("b", metadata("ts")).unwrap();
        buffer.create_time_series("c", metadata("ts")).unwrap(); // triggers flush

        let batch = buffer.flusher.batch(0);
        let node_ids: Vec<&str> = batch.changes().iter().map(Change::node_id).collect();
        assert_eq!(node_ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_validation_failure_leaves_buffer_untouched() {
        let buffer = ChangeBuffer::new(RecordingFlusher::default(), 100, 1000).unwrap();

        buffer.create_time_series("node1", metadata("ts")).unwrap();
        let before_count = buffer.pending_count();
        let before_size = buffer.pending_size();

        let result = buffer.add_double_time_series_data("node1", 1, "ts", vec![]);
        assert!(matches!(result, Err(TideError::Validation { field: "chunks", .. })));

        assert_eq!(buffer.pending_count(), before_count);
        assert_eq!(buffer.pending_size(), before_size);
        assert_eq!(buffer.flusher.batch_count(), 0);
    }

    #[test]
    fn test_failed_flush_still_clears_buffer() {
        let buffer = ChangeBuffer::new(FailingFlusher::default(), 2, 1000).unwrap();

        buffer.create_time_series("node1", metadata("ts")).unwrap();
        // Second append crosses the count threshold; the flusher fails.
        let result = buffer.create_time_series("node2", metadata("ts"));
        assert!(matches!(result, Err(TideError::Io { .. })));

        // The batch is gone either way.
        assert!(buffer.is_empty());
        assert_eq!(buffer.pending_size(), 0);
        assert_eq!(*buffer.flusher.calls.lock(), 1);
    }

    #[test]
    fn test_failed_explicit_flush_still_clears_buffer() {
        let buffer = ChangeBuffer::new(FailingFlusher::default(), 100, 1000).unwrap();

        buffer.create_time_series("node1", metadata("ts")).unwrap();
        assert!(buffer.flush().is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_closure_flusher() {
        let seen = Arc::new(PlMutex::new(0usize));
        let seen_clone = Arc::clone(&seen);
        let buffer = ChangeBuffer::new(
            move |change_set: &ChangeSet| {
                *seen_clone.lock() += change_set.len();
                Ok(())
            },
            1,
            1000,
        )
        .unwrap();

        buffer.create_time_series("node1", metadata("ts")).unwrap();
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn test_concurrent_producers_all_changes_flushed() {
        let buffer = Arc::new(ChangeBuffer::new(RecordingFlusher::default(), 7, 1 << 30).unwrap());

        let mut handles = vec![];
        for t in 0..4 {
            let buffer = Arc::clone(&buffer);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    buffer
                        .add_double_time_series_data(
                            format!("node-{}-{}", t, i),
                            1,
                            "ts",
                            vec![DataChunk::new(0, vec![1.0]).unwrap()],
                        )
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        buffer.flush().unwrap();

        let total: usize = {
            let batches = buffer.flusher.batches.lock();
            batches.iter().map(ChangeSet::len).sum()
        };
        assert_eq!(total, 200);
        assert!(buffer.is_empty());
    }
}
