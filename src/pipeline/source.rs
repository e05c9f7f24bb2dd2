//! Lazy, checkpoint-aware reader over the snapshot file.
//!
//! K_i: Line indices are 1-based and count every line of the file.
//! K_i: Lines covered by the checkpoint are never decoded or parsed.

use crate::models::{DistributorError, Record, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A parsed record together with its 1-based input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedRecord {
    pub line: u64,
    pub record: Record,
}

/// Forward-only record iterator that skips an already processed prefix.
pub struct RecordSource<R> {
    reader: R,
    buf: Vec<u8>,
    line: u64,
    skip_through: u64,
    skipped: u64,
}

impl RecordSource<BufReader<File>> {
    /// Open a snapshot file, skipping lines `1..=skip_through`.
    pub fn open(path: &Path, skip_through: u64) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            DistributorError::io(format!("opening snapshot {}", path.display()), e)
        })?;
        Ok(Self::from_reader(BufReader::new(file), skip_through))
    }
}

impl<R: BufRead> RecordSource<R> {
    pub fn from_reader(reader: R, skip_through: u64) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line: 0,
            skip_through,
            skipped: 0,
        }
    }

    /// Lines skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Lines read so far, skipped or not.
    pub fn lines_read(&self) -> u64 {
        self.line
    }

    /// Read the next raw line into `buf`, `false` at end of input.
    fn read_raw_line(&mut self) -> Result<bool> {
        self.buf.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .map_err(|e| DistributorError::io("reading snapshot", e))?;
        Ok(n > 0)
    }

    fn parse_current(&self) -> Result<NumberedRecord> {
        let raw = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let text = std::str::from_utf8(raw).map_err(|e| DistributorError::Parse {
            line: self.line,
            message: format!("invalid UTF-8: {e}"),
        })?;

        if text.trim().is_empty() {
            return Err(DistributorError::Parse {
                line: self.line,
                message: "blank line".to_string(),
            });
        }

        Record::from_json_line(text)
            .map(|record| NumberedRecord {
                line: self.line,
                record,
            })
            .map_err(|e| DistributorError::Parse {
                line: self.line,
                message: e.to_string(),
            })
    }
}

impl<R: BufRead> Iterator for RecordSource<R> {
    type Item = Result<NumberedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.read_raw_line() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
            self.line += 1;

            // Checkpointed lines are counted, never decoded
            if self.line <= self.skip_through {
                self.skipped += 1;
                continue;
            }

            return Some(self.parse_current());
        }
    }
}

/// Count lines in a snapshot, for progress reporting.
pub fn count_lines(path: &Path) -> Result<u64> {
    let file = File::open(path)
        .map_err(|e| DistributorError::io(format!("opening snapshot {}", path.display()), e))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| DistributorError::io("counting snapshot lines", e))?;
        if n == 0 {
            return Ok(count);
        }
        count += 1;
    }
}
