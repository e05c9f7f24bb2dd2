//! Offline submitter for planning runs.

use super::{BatchSubmitter, Submission, SubmissionStatus};
use crate::models::{Batch, Result};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use tracing::debug;

/// Pretends every batch is finalized immediately.
///
/// Hashes are synthetic (`0xdry…` followed by batch number and nonce) so
/// they can never be mistaken for real ones in a log.
#[derive(Debug, Clone, Default)]
pub struct DryRunSubmitter {
    start_nonce: u64,
}

impl DryRunSubmitter {
    pub fn new(start_nonce: u64) -> Self {
        Self { start_nonce }
    }
}

#[async_trait]
impl BatchSubmitter for DryRunSubmitter {
    async fn account_nonce(&self) -> Result<u64> {
        Ok(self.start_nonce)
    }

    async fn submit(&self, batch: &Batch) -> Result<Submission> {
        let tx_hash = format!("0xdry{:08x}{:08x}", batch.number, batch.nonce);
        debug!(batch = batch.number, records = batch.len(), "Dry-run submission");

        let statuses = stream::iter([
            SubmissionStatus::included(format!("{tx_hash}-included")),
            SubmissionStatus::finalized(format!("{tx_hash}-finalized")),
        ])
        .boxed();

        Ok(Submission { tx_hash, statuses })
    }
}
