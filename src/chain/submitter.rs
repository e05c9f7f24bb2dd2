//! Submission seam between the batch loop and a chain client.
//!
//! Epistemic foundation:
//! - K_i: One transaction per batch, signed with the batch nonce
//! - B_i: The network will eventually report a terminal status (might not)
//! - I^B: Status arrives asynchronously → awaited stream

use crate::models::{Batch, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// Kind of status transition reported by the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Included in a block, not yet final
    Included,
    /// Included in a finalized block; terminal success
    Finalized,
    /// Rejected as invalid or failed to dispatch; terminal failure
    Error,
    /// Watch lost or transaction dropped; it may still be included
    Unknown,
}

/// One status transition with its detail (block hash or error text).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionStatus {
    pub kind: StatusKind,
    pub detail: String,
}

impl SubmissionStatus {
    pub fn included(block_hash: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Included,
            detail: block_hash.into(),
        }
    }

    pub fn finalized(block_hash: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Finalized,
            detail: block_hash.into(),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            detail: detail.into(),
        }
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Unknown,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

/// A signed batch that has been handed to the network.
pub struct Submission {
    /// Hash of the combined extrinsic
    pub tx_hash: String,
    /// Status transitions, ending after the first terminal one
    pub statuses: BoxStream<'static, SubmissionStatus>,
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("tx_hash", &self.tx_hash)
            .finish_non_exhaustive()
    }
}

/// Chain client capable of submitting distribution batches.
///
/// Implementations build one atomic transaction per batch and report its
/// progress; they never retry on their own.
#[async_trait]
pub trait BatchSubmitter: Send + Sync {
    /// Next nonce for the signing account, as seen by the chain.
    async fn account_nonce(&self) -> Result<u64>;

    /// Build, sign (with `batch.nonce`) and submit a batch.
    ///
    /// A resumable error (see `DistributorError::is_resumable`) means nothing
    /// was broadcast. Any other error leaves the outcome unknown.
    async fn submit(&self, batch: &Batch) -> Result<Submission>;
}
