//! Local binlog directory
//!
//! Holds downloaded binlog files next to their `.meta` sidecars:
//!
//! ```text
//! binlog/
//! ├── binlog.000001
//! ├── binlog.000001.meta
//! ├── binlog.000002
//! └── binlog.000002.meta
//! ```
//!
//! Files are always ordered by their numeric sequence, and any list handed
//! out for replay is checked for gaps first. Only files sharing the server's
//! current binlog base name take part; leftovers from a renamed `log_bin`
//! are ignored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use pitr_core::{check_contiguous, sort_log_files, LogFile, PitrError, Result};
use tracing::{debug, warn};

use crate::decoder::{file_first_event_ts, LogDecoder};
use crate::meta::LogFileMeta;

/// Prefix of partially downloaded files
pub const DOWNLOAD_PREFIX: &str = "tmp-";

/// A local log file together with the time of its first event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedLogFile {
    /// The file
    pub file: LogFile,
    /// First event time (unix seconds)
    pub first_event_ts: i64,
}

/// Directory of downloaded binlog files
#[derive(Debug, Clone)]
pub struct LogDirectory {
    dir: PathBuf,
    /// Base name of the server's binlog files, once known
    base_name: Arc<RwLock<Option<String>>>,
}

impl LogDirectory {
    /// Wrap `dir`; nothing is created until [`LogDirectory::ensure_exists`]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        LogDirectory {
            dir: dir.into(),
            base_name: Arc::new(RwLock::new(None)),
        }
    }

    /// Only consider files named `<base>.<sequence>`
    pub fn with_base_name(self, base: impl Into<String>) -> Self {
        *self.base_name.write() = Some(base.into());
        self
    }

    /// Record the server's binlog base name; clones of this directory see it too
    pub fn set_base_name(&self, base: &str) {
        let mut current = self.base_name.write();
        if current.as_deref() != Some(base) {
            debug!(base, "binlog base name");
            *current = Some(base.to_string());
        }
    }

    /// Base name files are filtered by, if known
    pub fn base_name(&self) -> Option<String> {
        self.base_name.read().clone()
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if missing
    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Path of the log file `name`
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Path a download of `name` is written to before it is renamed
    pub fn download_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", DOWNLOAD_PREFIX, name))
    }

    /// All binlog files in the directory, sorted by sequence.
    ///
    /// Sidecars, partial downloads and unrelated names are ignored, as are
    /// files with a different base name once it is known. Before that, a
    /// directory mixing base names is an error.
    pub fn list_files(&self) -> Result<Vec<LogFile>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with(DOWNLOAD_PREFIX) {
                continue;
            }
            match LogFile::new(name, entry.metadata()?.len()) {
                Ok(file) => files.push(file),
                Err(PitrError::InvalidLogFileName { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        match self.base_name() {
            Some(base) => files.retain(|f| f.base_name() == base),
            None => {
                if let Some(first) = files.first() {
                    if let Some(other) = files.iter().find(|f| f.base_name() != first.base_name()) {
                        return Err(PitrError::precondition(format!(
                            "binlog directory {} holds both {} and {} files",
                            self.dir.display(),
                            first.base_name(),
                            other.base_name()
                        )));
                    }
                }
            }
        }
        sort_log_files(&mut files);
        Ok(files)
    }

    /// Local file `name`, if present
    pub fn find(&self, name: &str) -> Result<Option<LogFile>> {
        Ok(self.list_files()?.into_iter().find(|f| f.name == name))
    }

    /// First event time of `file`, from its sidecar or by decoding it.
    ///
    /// A freshly computed value is written back as a sidecar.
    pub fn first_event_ts(&self, file: &LogFile, decoder: &dyn LogDecoder) -> Result<i64> {
        match LogFileMeta::read_from_file(&self.dir, &file.name) {
            Ok(Some(meta)) => return Ok(meta.first_event_ts),
            Ok(None) => {}
            Err(e) => warn!(file = %file.name, error = %e, "ignoring unreadable sidecar"),
        }
        let ts = file_first_event_ts(decoder, self.file_path(&file.name))?.ok_or_else(|| {
            PitrError::malformed(0, format!("binlog file {} contains no events", file.name))
        })?;
        self.write_meta(&file.name, ts)?;
        Ok(ts)
    }

    /// Record the first event time of `name`
    pub fn write_meta(&self, name: &str, first_event_ts: i64) -> Result<()> {
        debug!(file = %name, first_event_ts, "writing sidecar");
        LogFileMeta { first_event_ts }.write_to_file(&self.dir, name)
    }

    /// All files with their first event times; the set must be contiguous
    pub fn indexed_files(&self, decoder: &dyn LogDecoder) -> Result<Vec<IndexedLogFile>> {
        let files = self.list_files()?;
        check_contiguous(&files)?;
        files
            .into_iter()
            .map(|file| {
                let first_event_ts = self.first_event_ts(&file, decoder)?;
                Ok(IndexedLogFile {
                    file,
                    first_event_ts,
                })
            })
            .collect()
    }

    /// Paths of files `start_seq..=target_seq`, checked for gaps
    pub fn replay_files(&self, start_seq: u64, target_seq: u64) -> Result<Vec<PathBuf>> {
        if start_seq > target_seq {
            return Err(PitrError::Config(format!(
                "replay start sequence {} is after target sequence {}",
                start_seq, target_seq
            )));
        }
        let files: Vec<LogFile> = self
            .list_files()?
            .into_iter()
            .filter(|f| (start_seq..=target_seq).contains(&f.sequence))
            .collect();

        let first = files.first().map(|f| f.sequence);
        let last = files.last().map(|f| f.sequence);
        if first != Some(start_seq) || last != Some(target_seq) {
            return Err(PitrError::DiscontinuousLogFiles {
                previous: format!("sequence {}", start_seq),
                next: format!("sequence {}", target_seq),
            });
        }
        check_contiguous(&files)?;
        Ok(files.iter().map(|f| self.file_path(&f.name)).collect())
    }

    /// Delete `name` and its sidecar
    pub fn remove(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.file_path(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        LogFileMeta::remove(&self.dir, name)
    }
}
