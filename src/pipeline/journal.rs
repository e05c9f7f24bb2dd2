//! Append-only submission log.
//!
//! One human-readable line per event, prefixed with an RFC 3339 timestamp.
//! Every line is flushed as it is written so the log survives a crash.

use crate::models::{Batch, DistributorError, Result};
use chrono::{SecondsFormat, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Durable record of what was submitted and how it ended.
///
/// A disabled journal accepts every event and writes nothing.
pub struct SubmissionJournal {
    file: Option<File>,
}

impl SubmissionJournal {
    /// Open (or create) the log in append mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| DistributorError::io("creating log directory", e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| DistributorError::io(format!("opening log {}", path.display()), e))?;
        Ok(Self { file: Some(file) })
    }

    /// Journal for planning runs.
    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn submitting(&mut self, batch: &Batch, tx_hash: &str) -> Result<()> {
        self.write_line(&format!(
            "Submitting Asset Distribution Batch {}, Batch Hash: {tx_hash}, nonce: {}",
            batch.number, batch.nonce
        ))
    }

    pub fn included(&mut self, batch: &Batch, block_hash: &str) -> Result<()> {
        self.write_line(&format!(
            "Batch {} included in block: {block_hash}, nonce: {}",
            batch.number, batch.nonce
        ))
    }

    pub fn finalized(&mut self, batch: &Batch, block_hash: &str) -> Result<()> {
        self.write_line(&format!(
            "Batch {} finalized in block: {block_hash}",
            batch.number
        ))
    }

    /// Failure reported by the network, with every record of the batch.
    pub fn batch_error(&mut self, batch: &Batch, detail: &str) -> Result<()> {
        self.write_line(&format!("Error in batch {}: {detail}", batch.number))?;
        self.write_records(batch)
    }

    /// Failure before or during submission, with every record of the batch.
    pub fn submission_error(&mut self, batch: &Batch, detail: &str) -> Result<()> {
        self.write_line(&format!(
            "Error in asset distribution batch transaction: {detail}"
        ))?;
        self.write_records(batch)
    }

    fn write_records(&mut self, batch: &Batch) -> Result<()> {
        for record in &batch.records {
            self.write_line(&record.to_string())?;
        }
        Ok(())
    }

    fn write_line(&mut self, message: &str) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        writeln!(file, "{ts} {message}")
            .and_then(|()| file.flush())
            .map_err(|e| DistributorError::io("writing submission log", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use tempfile::TempDir;

    fn batch() -> Batch {
        Batch {
            number: 1,
            nonce: 9,
            first_line: 301,
            records: vec![
                Record {
                    account_id: "5Alice".to_string(),
                    total: 100,
                    count: 1,
                },
                Record {
                    account_id: "5Bob".to_string(),
                    total: 200,
                    count: 4,
                },
            ],
        }
    }

    #[test]
    fn test_event_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/distribution.log");
        let mut journal = SubmissionJournal::open(&path).unwrap();

        journal.submitting(&batch(), "0xaa").unwrap();
        journal.included(&batch(), "0xbb").unwrap();
        journal.finalized(&batch(), "0xcc").unwrap();

        let log = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("Submitting Asset Distribution Batch 1, Batch Hash: 0xaa, nonce: 9"));
        assert!(lines[1].ends_with("Batch 1 included in block: 0xbb, nonce: 9"));
        assert!(lines[2].ends_with("Batch 1 finalized in block: 0xcc"));
    }

    #[test]
    fn test_error_lists_every_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("distribution.log");
        let mut journal = SubmissionJournal::open(&path).unwrap();

        journal.batch_error(&batch(), "Module error: BalanceLow").unwrap();

        let log = fs::read_to_string(&path).unwrap();
        assert!(log.contains("Error in batch 1: Module error: BalanceLow"));
        assert!(log.contains("Account ID: 5Alice, Total: 100, Count: 1"));
        assert!(log.contains("Account ID: 5Bob, Total: 200, Count: 4"));
    }

    #[test]
    fn test_appends_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("distribution.log");

        SubmissionJournal::open(&path)
            .unwrap()
            .finalized(&batch(), "0x01")
            .unwrap();
        SubmissionJournal::open(&path)
            .unwrap()
            .submission_error(&batch(), "invalid account")
            .unwrap();

        let log = fs::read_to_string(&path).unwrap();
        assert_eq!(log.lines().count(), 4);
        assert!(log.contains("Error in asset distribution batch transaction: invalid account"));
    }
}
