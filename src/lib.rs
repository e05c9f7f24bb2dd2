//! distributor - Resumable batched asset distribution to a Substrate chain.
//!
//! ## Architecture
//!
//! A snapshot of `(account, total, count)` records is read line by line,
//! grouped into fixed-size batches and submitted one batch at a time as a
//! single `Utility::batch_all` extrinsic minting (and optionally freezing)
//! the asset for every beneficiary.
//!
//! ## Modules
//!
//! - **pipeline**: Snapshot source → batch runner → submission journal
//! - **chain**: `BatchSubmitter` seam with a subxt-backed and a dry-run implementation
//! - **checkpoint**: Persisted progress and the in-flight batch marker
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Checkpoint only advances after finalization
//! - B_i (Beliefs): Every chain interaction returns a Result
//! - I^R (Resolvable): Node, asset and file locations come from config
//! - I^B (Bounded): Connection retries and a finality timeout

pub mod chain;
pub mod checkpoint;
pub mod models;
pub mod pipeline;

// Re-exports for convenience
pub use chain::{BatchSubmitter, DryRunSubmitter, SubstrateSubmitter};
pub use checkpoint::{
    Checkpoint, CheckpointStore, FileCheckpointStore, InflightMarker, MemoryCheckpointStore,
};
pub use models::{Batch, Config, DistributorError, Record, Result, RunStats};
pub use pipeline::{BatchRunner, RunnerOptions, SubmissionJournal};
