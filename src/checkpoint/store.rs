//! Checkpoint persistence.
//!
//! Epistemic foundation:
//! - K_i: Each value lives in its own plain-text file (one decimal integer)
//! - K_i: Writes are atomic (write-then-rename)
//! - B_i: A missing file means zero

use super::Checkpoint;
use crate::models::{DistributorError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where checkpoints are loaded from and saved to.
pub trait CheckpointStore {
    /// Load the persisted checkpoint, zero if none was saved yet.
    fn load(&self) -> Result<Checkpoint>;

    /// Persist a checkpoint, replacing the previous one.
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()>;
}

/// Two-file store: last processed line and current batch number.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    last_line_path: PathBuf,
    batch_number_path: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store over the two given files.
    pub fn new(last_line_path: impl Into<PathBuf>, batch_number_path: impl Into<PathBuf>) -> Self {
        Self {
            last_line_path: last_line_path.into(),
            batch_number_path: batch_number_path.into(),
        }
    }

    /// Path of the last-processed-line file.
    pub fn last_line_path(&self) -> &Path {
        &self.last_line_path
    }

    /// Path of the batch-number file.
    pub fn batch_number_path(&self) -> &Path {
        &self.batch_number_path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Checkpoint> {
        Ok(Checkpoint {
            last_processed_line: read_counter(&self.last_line_path)?,
            current_batch_number: read_counter(&self.batch_number_path)?,
        })
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        write_counter(&self.last_line_path, checkpoint.last_processed_line)?;
        write_counter(&self.batch_number_path, checkpoint.current_batch_number)?;
        debug!(
            last_processed_line = checkpoint.last_processed_line,
            current_batch_number = checkpoint.current_batch_number,
            "Checkpoint saved"
        );
        Ok(())
    }
}

fn read_counter(path: &Path) -> Result<u64> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(DistributorError::io(format!("reading {}", path.display()), e)),
    };

    content
        .trim()
        .parse::<u64>()
        .map_err(|_| DistributorError::CorruptCheckpoint {
            path: path.to_path_buf(),
            content,
        })
}

/// Atomically replace the contents of `path`.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| DistributorError::io(format!("creating {}", parent.display()), e))?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, content)
        .map_err(|e| DistributorError::io(format!("writing {}", temp_path.display()), e))?;
    fs::rename(&temp_path, path)
        .map_err(|e| DistributorError::io(format!("renaming to {}", path.display()), e))
}

fn write_counter(path: &Path, value: u64) -> Result<()> {
    write_atomic(path, value.to_string().as_bytes())
}

/// In-process store that remembers every saved checkpoint.
///
/// Backs planning runs, which must never touch the real checkpoint files.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    current: Checkpoint,
    history: Vec<Checkpoint>,
}

impl MemoryCheckpointStore {
    /// Start from an existing checkpoint.
    pub fn starting_at(checkpoint: Checkpoint) -> Self {
        Self {
            current: checkpoint,
            history: Vec::new(),
        }
    }

    /// Every checkpoint saved so far, oldest first.
    pub fn history(&self) -> &[Checkpoint] {
        &self.history
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<Checkpoint> {
        Ok(self.current)
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        self.current = *checkpoint;
        self.history.push(*checkpoint);
        Ok(())
    }
}
