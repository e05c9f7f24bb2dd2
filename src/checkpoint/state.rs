//! Checkpoint value for resumable distribution.
//!
//! Epistemic foundation:
//! - K_i: `last_processed_line` never decreases
//! - K_i: `current_batch_number` increments once per completed batch
//! - B_i: Checkpoint files may not exist → zero state

use crate::models::{Batch, DistributorError, Result};
use serde::{Deserialize, Serialize};

/// Progress marker persisted between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// 1-based index of the last input line covered by a finalized batch
    pub last_processed_line: u64,
    /// Number assigned to the next batch
    pub current_batch_number: u64,
}

impl Checkpoint {
    /// Creates the zero checkpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the given 1-based input line was already distributed.
    pub const fn covers_line(&self, line: u64) -> bool {
        line <= self.last_processed_line
    }

    /// Returns the checkpoint after `batch` has been finalized.
    ///
    /// The batch must start right after the current position and carry the
    /// current batch number; anything else would skip or repeat records.
    pub fn advanced_past(&self, batch: &Batch) -> Result<Self> {
        if batch.is_empty() {
            return Err(DistributorError::Internal(format!(
                "batch {} has no records",
                batch.number
            )));
        }
        if batch.first_line != self.last_processed_line + 1 {
            return Err(DistributorError::Internal(format!(
                "batch {} starts at line {} but checkpoint is at line {}",
                batch.number, batch.first_line, self.last_processed_line
            )));
        }
        if batch.number != self.current_batch_number {
            return Err(DistributorError::Internal(format!(
                "batch {} does not match checkpoint batch number {}",
                batch.number, self.current_batch_number
            )));
        }

        Ok(Self {
            last_processed_line: batch.last_line(),
            current_batch_number: self.current_batch_number + 1,
        })
    }
}
