//! Append-only change journal
//!
//! Each flushed batch becomes one journal record:
//!
//!   [0..4]   magic:    [u8;4] - "TIDE"
//!   [4..8]   length:   u32 LE - payload length in bytes
//!   [8..12]  checksum: u32 LE - CRC32C of payload bytes
//!   [12..16] reserved: [u8;4] - must be zero
//!   [16..]   payload:  wire::encode_change_set
//!
//! Writes are durable before `append_durable` returns: serialize, append,
//! `durable_sync`, then return. Files rotate at a size threshold and are
//! named `journal-{seq:016x}.tide` so lexicographic order is sequence
//! order. The reader replays files in that order, yielding change sets in
//! the order they were flushed; it stops cleanly at a torn tail and
//! resyncs past corrupt records by scanning for the next magic.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tidestore_core::error::{TideError, TideResult};
use tidestore_core::wire::{decode_change_set, encode_change_set};
use tidestore_core::ChangeSet;

use crate::durability::durable_sync;

/// Magic bytes identifying a journal record: "TIDE" in ASCII
pub const MAGIC_ARRAY: [u8; 4] = [0x54, 0x49, 0x44, 0x45];

/// Record header size in bytes
pub const HEADER_SIZE: usize = 16;

/// Journal file rotation threshold (64MB)
const ROTATION_SIZE: u64 = 64 * 1024 * 1024;

fn journal_file_name(sequence: u64) -> String {
    format!("journal-{:016x}.tide", sequence)
}

fn is_journal_file(name: &str) -> bool {
    name.starts_with("journal-") && name.ends_with(".tide")
}

/// Appends encoded change sets to rotating journal files.
pub struct JournalWriter {
    /// Current journal file handle
    file: File,
    /// Path to the current file (for error context)
    path: PathBuf,
    /// Current file size in bytes (tracked to avoid stat calls)
    size: u64,
    /// Journal directory for file rotation
    dir: PathBuf,
    /// Monotonic sequence number for file naming
    sequence: u64,
}

impl JournalWriter {
    /// Create a writer in the given directory. If journal files already
    /// exist, resumes appending to the highest sequence number.
    pub fn new<P: AsRef<Path>>(dir: P) -> TideResult<Self> {
        let dir = dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&dir).map_err(|e| TideError::Io {
            path: Some(dir.clone()),
            kind: e.kind(),
            message: format!("Failed to create journal directory: {}", e),
        })?;

        let sequence = Self::find_max_sequence(&dir);
        let path = dir.join(journal_file_name(sequence));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TideError::Io {
                path: Some(path.clone()),
                kind: e.kind(),
                message: format!("Failed to open journal file: {}", e),
            })?;

        let size = file
            .metadata()
            .map_err(|e| TideError::Io {
                path: Some(path.clone()),
                kind: e.kind(),
                message: format!("Failed to stat journal file: {}", e),
            })?
            .len();

        Ok(Self { file, path, size, dir, sequence })
    }

    /// Highest journal sequence number in the directory, 0 if none.
    fn find_max_sequence(dir: &Path) -> u64 {
        let mut max_seq = 0u64;

        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if is_journal_file(name) {
                        let hex = &name[8..name.len() - 5]; // strip "journal-" and ".tide"
                        if let Ok(seq) = u64::from_str_radix(hex, 16) {
                            max_seq = max_seq.max(seq);
                        }
                    }
                }
            }
        }

        max_seq
    }

    /// Append one change set as a single durable record.
    ///
    /// Write ordering: serialize (with CRC32C), append header + payload,
    /// `durable_sync`, only then return. After Ok the record survives
    /// power loss.
    pub fn append_durable(&mut self, change_set: &ChangeSet) -> TideResult<()> {
        let payload = encode_change_set(change_set)?;

        let mut record = Vec::with_capacity(HEADER_SIZE + payload.len());
        record.extend_from_slice(&MAGIC_ARRAY);
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&crc32c::crc32c(&payload).to_le_bytes());
        record.extend_from_slice(&[0u8; 4]); // reserved
        record.extend_from_slice(&payload);

        if self.size + record.len() as u64 > ROTATION_SIZE {
            self.rotate()?;
        }

        self.file.write_all(&record).map_err(|e| TideError::Io {
            path: Some(self.path.clone()),
            kind: e.kind(),
            message: format!("Journal write failed: {}", e),
        })?;

        durable_sync(&self.file).map_err(|e| TideError::Io {
            path: Some(self.path.clone()),
            kind: e.kind(),
            message: format!("Journal durable_sync failed: {}", e),
        })?;

        self.size += record.len() as u64;
        Ok(())
    }

    /// Switch to a new journal file. Syncs the current one first.
    fn rotate(&mut self) -> TideResult<()> {
        durable_sync(&self.file).map_err(|e| TideError::Io {
            path: Some(self.path.clone()),
            kind: e.kind(),
            message: format!("Journal sync before rotation failed: {}", e),
        })?;

        self.sequence += 1;
        let new_path = self.dir.join(journal_file_name(self.sequence));

        let new_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&new_path)
            .map_err(|e| TideError::Io {
                path: Some(new_path.clone()),
                kind: e.kind(),
                message: format!("Failed to create rotated journal file: {}", e),
            })?;

        self.file = new_file;
        self.path = new_path;
        self.size = 0;

        Ok(())
    }

    /// Current journal file path (for diagnostics).
    pub fn current_path(&self) -> &Path {
        &self.path
    }

    /// Current journal file size in bytes.
    pub fn current_size(&self) -> u64 {
        self.size
    }
}

/// Replays journal files, yielding change sets in flush order.
pub struct JournalReader {
    dir: PathBuf,
}

impl JournalReader {
    /// Create a reader for the given journal directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    /// Read all change sets from all journal files in sequence order.
    ///
    /// Per file:
    /// 1. Validate magic bytes at the record start
    /// 2. Check payload length against remaining bytes; a short tail is a
    ///    torn write — stop there, everything before it is intact
    /// 3. Verify CRC32C over the payload
    /// 4. Decode the change set
    /// 5. On corruption, scan forward for the next magic and resync
    pub fn read_all(&self) -> TideResult<Vec<ChangeSet>> {
        let mut files: Vec<PathBuf> = Vec::new();

        let entries = std::fs::read_dir(&self.dir).map_err(|e| TideError::Io {
            path: Some(self.dir.clone()),
            kind: e.kind(),
            message: format!("Failed to read journal directory: {}", e),
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| TideError::Io {
                path: Some(self.dir.clone()),
                kind: e.kind(),
                message: format!("Failed to read directory entry: {}", e),
            })?;
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if is_journal_file(name) {
                    files.push(path);
                }
            }
        }

        files.sort(); // lexicographic sort = sequence order (hex-padded)

        let mut all_sets = Vec::new();
        for path in &files {
            all_sets.extend(self.read_file(path)?);
        }
        Ok(all_sets)
    }

    /// Read the records of a single journal file.
    fn read_file(&self, path: &Path) -> TideResult<Vec<ChangeSet>> {
        let mut file = File::open(path).map_err(|e| TideError::Io {
            path: Some(path.to_path_buf()),
            kind: e.kind(),
            message: format!("Failed to open journal file: {}", e),
        })?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).map_err(|e| TideError::Io {
            path: Some(path.to_path_buf()),
            kind: e.kind(),
            message: format!("Failed to read journal file: {}", e),
        })?;

        let mut sets = Vec::new();
        let mut offset = 0;

        while offset + HEADER_SIZE <= buffer.len() {
            if buffer[offset..offset + 4] != MAGIC_ARRAY {
                // Not a record start — resync
                match find_next_magic(&buffer, offset + 1) {
                    Some(next) => {
                        offset = next;
                        continue;
                    }
                    None => break,
                }
            }

            let length = u32::from_le_bytes([
                buffer[offset + 4],
                buffer[offset + 5],
                buffer[offset + 6],
                buffer[offset + 7],
            ]) as usize;

            let record_end = offset + HEADER_SIZE + length;
            if record_end > buffer.len() {
                // Torn write — the record never completed. Stop here.
                break;
            }

            match decode_record(path, &buffer, offset, record_end) {
                Ok(set) => {
                    sets.push(set);
                    offset = record_end;
                }
                // Corrupt record — skip it and resync past its magic
                Err(_) => match find_next_magic(&buffer, offset + 4) {
                    Some(next) => {
                        offset = next;
                        continue;
                    }
                    None => break,
                },
            }
        }

        Ok(sets)
    }
}

/// Verify and decode one complete record at `offset`.
fn decode_record(
    path: &Path,
    buffer: &[u8],
    offset: usize,
    record_end: usize,
) -> TideResult<ChangeSet> {
    let checksum = u32::from_le_bytes([
        buffer[offset + 8],
        buffer[offset + 9],
        buffer[offset + 10],
        buffer[offset + 11],
    ]);

    let payload = &buffer[offset + HEADER_SIZE..record_end];
    let computed = crc32c::crc32c(payload);
    if computed != checksum {
        return Err(TideError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: checksum,
            actual: computed,
            offset: offset as u64,
        });
    }

    decode_change_set(payload)
}

/// Find the next occurrence of the TIDE magic at or after `start`.
fn find_next_magic(buffer: &[u8], start: usize) -> Option<usize> {
    if buffer.len() < 4 {
        return None;
    }
    (start..=buffer.len() - 4).find(|&i| buffer[i..i + 4] == MAGIC_ARRAY)
}
