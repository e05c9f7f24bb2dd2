//! Write-ahead marker for the batch currently on the wire.
//!
//! Epistemic foundation:
//! - K_i: Marker is written before submission and removed once the outcome is known
//! - B_i: Outcome of a submission may be unknown (crash, timeout) → marker survives
//! - I^B: A surviving marker on startup means the chain must be checked by hand

use super::store::write_atomic;
use crate::models::{Batch, DistributorError, Record, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persisted description of a submitted but unresolved batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InflightBatch {
    pub batch_number: u64,
    pub nonce: u64,
    pub first_line: u64,
    pub last_line: u64,
    /// Extrinsic hash, once the submitter has reported it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub records: Vec<Record>,
    pub started_at: DateTime<Utc>,
}

impl InflightBatch {
    /// Describe a batch about to be submitted.
    pub fn for_batch(batch: &Batch) -> Self {
        Self {
            batch_number: batch.number,
            nonce: batch.nonce,
            first_line: batch.first_line,
            last_line: batch.last_line(),
            tx_hash: None,
            records: batch.records.clone(),
            started_at: Utc::now(),
        }
    }

    /// Error reported when this marker blocks a new run.
    pub fn unresolved_error(&self) -> DistributorError {
        DistributorError::InflightBatchUnresolved {
            batch: self.batch_number,
            nonce: self.nonce,
            first_line: self.first_line,
            last_line: self.last_line,
            tx_hash: self.tx_hash.clone(),
        }
    }
}

/// Owner of the in-flight marker file.
///
/// A disabled marker (planning runs) never touches the filesystem.
#[derive(Debug, Clone)]
pub struct InflightMarker {
    path: Option<PathBuf>,
}

impl InflightMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read a marker left behind by a previous run.
    pub fn recover(&self) -> Result<Option<InflightBatch>> {
        let Some(path) = self.path.as_deref() else {
            return Ok(None);
        };
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DistributorError::io("reading in-flight marker", e)),
        };

        let inflight: InflightBatch = serde_json::from_str(&content).map_err(|e| {
            DistributorError::Internal(format!(
                "Invalid in-flight marker {}: {e}",
                path.display()
            ))
        })?;

        warn!(
            batch = inflight.batch_number,
            nonce = inflight.nonce,
            path = %path.display(),
            "Found in-flight batch from a previous run"
        );
        Ok(Some(inflight))
    }

    /// Record that a batch is about to be submitted.
    pub fn begin(&self, inflight: &InflightBatch) -> Result<()> {
        self.persist(inflight)?;
        debug!(batch = inflight.batch_number, "In-flight marker written");
        Ok(())
    }

    /// Attach the extrinsic hash to the marker.
    pub fn record_hash(&self, inflight: &mut InflightBatch, tx_hash: &str) -> Result<()> {
        inflight.tx_hash = Some(tx_hash.to_string());
        self.persist(inflight)
    }

    /// Remove the marker once the outcome of the batch is known.
    pub fn clear(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        match fs::remove_file(path) {
            Ok(()) => {
                debug!("In-flight marker cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DistributorError::io("removing in-flight marker", e)),
        }
    }

    fn persist(&self, inflight: &InflightBatch) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(inflight).map_err(|e| {
            DistributorError::Internal(format!("Serializing in-flight marker: {e}"))
        })?;
        write_atomic(path, content.as_bytes())
    }
}
