//! Durable per-shard resume point.
//!
//! The checkpoint is a text file holding a single decimal integer: the index
//! of the next item this shard has not processed yet.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use shardscrape_shared::{Result, ScrapeError};

/// File-backed checkpoint for one shard.
#[derive(Debug, Clone)]
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored resume index, or 0 when no checkpoint exists yet.
    ///
    /// A file that exists but does not hold a non-negative integer is an
    /// error; resuming from a guessed position could skip or repeat work.
    pub fn load(&self) -> Result<usize> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "no checkpoint, starting from 0");
                return Ok(0);
            }
            Err(e) => return Err(ScrapeError::io(&self.path, e)),
        };

        content.trim().parse::<usize>().map_err(|e| {
            ScrapeError::parse(format!(
                "checkpoint {} holds {:?}: {e}",
                self.path.display(),
                content.trim()
            ))
        })
    }

    /// Atomically replace the stored index.
    ///
    /// Writes a sibling temp file, syncs it to disk, and renames it over the
    /// checkpoint, so a crash or power loss leaves either the old or the new
    /// value.
    pub fn save(&self, next_index: usize) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ScrapeError::io(parent, e))?;
            }
        }

        let tmp = self.tmp_path();
        write_synced(&tmp, format!("{next_index}\n").as_bytes())
            .map_err(|e| ScrapeError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| ScrapeError::io(&self.path, e))?;
        Ok(())
    }

    /// Delete the checkpoint. Returns whether a file was removed.
    pub fn reset(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = ?self.path, "checkpoint removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ScrapeError::io(&self.path, e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
