//! Per-file metadata sidecars.
//!
//! Each downloaded binlog file `binlog.000042` gets a companion
//! `binlog.000042.meta` holding the time of its first event, so coordinate
//! resolution does not have to decode every file on every recovery.
//!
//! ```text
//! {"first_event_ts":1665987924}
//! ```
//!
//! Sidecars are optional. A missing or unreadable sidecar is recomputed
//! through the decoder.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use pitr_core::Result;

/// Extension appended to the log file name
pub const META_EXTENSION: &str = "meta";

/// Metadata for one binlog file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFileMeta {
    /// Time of the first non-synthetic event (unix seconds)
    pub first_event_ts: i64,
}

impl LogFileMeta {
    /// Sidecar path for `name` in `dir`
    pub fn meta_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.{}", name, META_EXTENSION))
    }

    /// Write the sidecar using write-fsync-rename
    pub fn write_to_file(&self, dir: &Path, name: &str) -> Result<()> {
        let final_path = Self::meta_path(dir, name);
        let temp_path = dir.join(format!("{}.{}.tmp", name, META_EXTENSION));

        let bytes = serde_json::to_vec(self)?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &final_path)?;

        if let Ok(dir_fd) = File::open(dir) {
            let _ = dir_fd.sync_all();
        }
        Ok(())
    }

    /// Read the sidecar for `name`; `Ok(None)` if it does not exist
    pub fn read_from_file(dir: &Path, name: &str) -> Result<Option<Self>> {
        let path = Self::meta_path(dir, name);
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the sidecar if present
    pub fn remove(dir: &Path, name: &str) -> Result<()> {
        match std::fs::remove_file(Self::meta_path(dir, name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
