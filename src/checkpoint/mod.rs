//! Checkpoint module for resumable distribution.
//!
//! Provides:
//! - `Checkpoint`: Progress value (last processed line, batch counter)
//! - `CheckpointStore`: Persistence seam, with file and in-memory stores
//! - `InflightMarker`: Write-ahead record of the batch on the wire

mod inflight;
mod state;
mod store;

pub use inflight::*;
pub use state::*;
pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
