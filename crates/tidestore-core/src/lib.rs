//! TideStore Core — Mutation Buffering for Versioned Time Series
//!
//! A buffering and flush-coordination layer sitting in front of a
//! node-addressed storage backend that holds versioned time series.
//!
//! # Architecture
//!
//! - **Change model**: every mutation is one immutable, validated `Change`
//!   (create a series, append numeric or textual chunks)
//! - **Batching**: a `ChangeBuffer` accumulates changes into a `ChangeSet`
//!   and hands full batches to a `Flusher` when a count or estimated-size
//!   threshold is crossed, or on an explicit `flush()`
//! - **Wire format**: changes carry a closed tag set so a remote or
//!   persisted flusher can reconstruct the exact variant
//!
//! # Storage Agnostic
//!
//! This crate never persists anything and performs no I/O. The `Flusher`
//! trait is the sole seam to the real store; durable flushers live in
//! separate crates (e.g. tidestore-journal).

pub mod buffer;
pub mod change;
pub mod changeset;
pub mod config;
pub mod error;
pub mod series;
pub mod wire;

// Re-export key types for convenience
pub use buffer::{ChangeBuffer, Flusher};
pub use change::{Change, ChangeTag, ChunksAddition};
pub use changeset::ChangeSet;
pub use config::BufferConfig;
pub use error::{TideError, TideResult};
pub use series::{DataChunk, TimeIndex, TimeSeriesDataType, TimeSeriesMetadata};
