//! TideStore change journal
//!
//! A durable `Flusher` implementation for the TideStore buffering core.
//! Every batch the buffer flushes becomes one checksummed record in an
//! append-only journal file; a reader replays the records in flush order
//! so a downstream store can apply them.
//!
//! # Architecture
//!
//! - Record = 16-byte header (magic, length, CRC32C) + encoded change set
//! - Appends are durable before `flush` returns (`durable_sync`)
//! - Files rotate at a size threshold; names sort in sequence order
//! - Replay validates checksums, stops at a torn tail, and resyncs past
//!   corrupt records

pub mod durability;
pub mod flusher;
pub mod journal;

pub use flusher::JournalFlusher;
pub use journal::{JournalReader, JournalWriter};
