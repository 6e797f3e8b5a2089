//! JournalFlusher — a durable `Flusher` backed by the change journal
//!
//! Drop-in persistence collaborator for a `ChangeBuffer`: every batch the
//! buffer hands over becomes one durable journal record. The writer sits
//! behind a mutex because the journal has a single-writer discipline,
//! while `Flusher::flush` takes `&self`.

use std::path::Path;

use parking_lot::Mutex;

use tidestore_core::error::TideResult;
use tidestore_core::{ChangeSet, Flusher};

use crate::journal::JournalWriter;

/// Applies flushed batches by appending them to an on-disk journal.
pub struct JournalFlusher {
    writer: Mutex<JournalWriter>,
}

impl JournalFlusher {
    /// Open a journal flusher over the given directory, resuming any
    /// existing journal files.
    pub fn open<P: AsRef<Path>>(dir: P) -> TideResult<Self> {
        Ok(Self {
            writer: Mutex::new(JournalWriter::new(dir)?),
        })
    }
}

impl Flusher for JournalFlusher {
    fn flush(&self, change_set: &ChangeSet) -> TideResult<()> {
        let mut writer = self.writer.lock();
        writer.append_durable(change_set)
    }
}
