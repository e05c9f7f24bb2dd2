//! Error types for the distributor.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (malformed input, bad config)
//! - I^B materialized: Chain and filesystem failures
//! - K_i violated: Internal invariant violations (bugs)

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the distributor.
#[derive(Debug, Error)]
pub enum DistributorError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED: Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: u64, message: String },

    #[error("Failed to build batch {batch}: {message}")]
    BatchBuild { batch: u64, message: String },

    #[error(
        "Batch {batch} (nonce {nonce}, lines {first_line}..={last_line}) was in flight when \
         the previous run stopped{}; verify it on chain, then rerun with --discard-inflight",
        .tx_hash.as_deref().map(|h| format!(" with hash {h}")).unwrap_or_default()
    )]
    InflightBatchUnresolved {
        batch: u64,
        nonce: u64,
        first_line: u64,
        last_line: u64,
        tx_hash: Option<String>,
    },

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED: Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════

    #[error("Chain client error: {0}")]
    Chain(String),

    #[error("Batch {batch} failed on chain: {detail}")]
    Dispatch { batch: u64, detail: String },

    #[error("Batch {batch} not finalized within {timeout:?}")]
    FinalityTimeout { batch: u64, timeout: Duration },

    #[error("Status stream for batch {batch} ended before finalization")]
    StatusStreamClosed { batch: u64 },

    #[error("Outcome of batch {batch} is unknown, it may still be included: {detail}")]
    OutcomeUnknown { batch: u64, detail: String },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt checkpoint file {path}: {content:?}")]
    CorruptCheckpoint { path: PathBuf, content: String },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED: Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DistributorError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether a plain restart retries the failed batch cleanly.
    ///
    /// False when the outcome of a submission is unknown and the in-flight
    /// marker must be reviewed first.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::Chain(_) | Self::Dispatch { .. } | Self::BatchBuild { .. }
        )
    }

    /// Batch number this error is attached to, if any.
    pub fn batch(&self) -> Option<u64> {
        match self {
            Self::BatchBuild { batch, .. }
            | Self::InflightBatchUnresolved { batch, .. }
            | Self::Dispatch { batch, .. }
            | Self::FinalityTimeout { batch, .. }
            | Self::StatusStreamClosed { batch }
            | Self::OutcomeUnknown { batch, .. } => Some(*batch),
            _ => None,
        }
    }
}

/// Result type alias for the distributor.
pub type Result<T> = std::result::Result<T, DistributorError>;
