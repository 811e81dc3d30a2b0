//! Reconciling the local binlog directory with the server's inventory
//!
//! For each file the server lists:
//!
//! - absent locally: download it
//! - present with a different size: the copy is stale, delete and download
//! - present with the same size: keep it
//!
//! Downloads land under a `tmp-` name and are renamed into place only after
//! their size checks out. Completed files must match the listed size exactly.
//! The newest file may still be receiving writes, so a copy at least as large
//! as the listed size is accepted.

use std::path::{Path, PathBuf};

use pitr_core::{sort_log_files, LogFile, PitrError, Result};
use tracing::{debug, info};

use crate::decoder::LogDecoder;
use crate::registry::LogDirectory;

/// Downloads one binlog file from the server
pub trait LogFetcher: Send + Sync {
    /// Download `name` to `dest`, returning the number of bytes written
    fn fetch(&self, name: &str, dest: &Path) -> Result<u64>;
}

/// What a reconciliation pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Files downloaded for the first time
    pub downloaded: Vec<String>,
    /// Stale local copies that were replaced
    pub replaced: Vec<String>,
    /// Files already up to date
    pub kept: Vec<String>,
    /// Newest file skipped because `download_latest` is off
    pub skipped_latest: Option<String>,
}

/// Brings a [`LogDirectory`] in line with a remote inventory
pub struct LogSync<'a> {
    dir: &'a LogDirectory,
    fetcher: &'a dyn LogFetcher,
    decoder: &'a dyn LogDecoder,
    download_latest: bool,
}

impl<'a> LogSync<'a> {
    /// Sync into `dir` using `fetcher`; sidecars are computed with `decoder`
    pub fn new(
        dir: &'a LogDirectory,
        fetcher: &'a dyn LogFetcher,
        decoder: &'a dyn LogDecoder,
    ) -> Self {
        LogSync {
            dir,
            fetcher,
            decoder,
            download_latest: true,
        }
    }

    /// Whether to fetch the newest, still-open file
    pub fn download_latest(mut self, enabled: bool) -> Self {
        self.download_latest = enabled;
        self
    }

    /// Reconcile against `remote`
    pub fn sync(&self, remote: &[LogFile]) -> Result<SyncReport> {
        self.dir.ensure_exists()?;
        let mut remote = remote.to_vec();
        sort_log_files(&mut remote);
        if let Some(base) = remote.last().map(|f| f.base_name().to_string()) {
            remote.retain(|f| f.base_name() == base);
            self.dir.set_base_name(&base);
        }

        let local = self.dir.list_files()?;
        let mut report = SyncReport::default();

        for (i, file) in remote.iter().enumerate() {
            let is_latest = i + 1 == remote.len();
            if is_latest && !self.download_latest {
                debug!(file = %file.name, "skipping newest binlog file");
                report.skipped_latest = Some(file.name.clone());
                continue;
            }

            match local.iter().find(|l| l.name == file.name) {
                Some(existing) if existing.size == file.size => {
                    // Backfill a sidecar lost to an earlier crash
                    self.dir.first_event_ts(existing, self.decoder)?;
                    report.kept.push(file.name.clone());
                }
                Some(existing) => {
                    info!(
                        file = %file.name,
                        local_size = existing.size,
                        remote_size = file.size,
                        "replacing stale binlog file"
                    );
                    self.dir.remove(&file.name)?;
                    self.download(file, is_latest)?;
                    report.replaced.push(file.name.clone());
                }
                None => {
                    self.download(file, is_latest)?;
                    report.downloaded.push(file.name.clone());
                }
            }
        }
        Ok(report)
    }

    fn download(&self, file: &LogFile, is_latest: bool) -> Result<PathBuf> {
        let tmp = self.dir.download_path(&file.name);
        info!(file = %file.name, size = file.size, "downloading binlog file");

        let result = self.fetcher.fetch(&file.name, &tmp).and_then(|_| {
            let size = std::fs::metadata(&tmp)?.len();
            let acceptable = if is_latest {
                size >= file.size
            } else {
                size == file.size
            };
            if !acceptable {
                return Err(PitrError::tool(
                    "binlog download",
                    format!(
                        "{} has {} bytes, server listed {}",
                        file.name, size, file.size
                    ),
                ));
            }
            Ok(())
        });
        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        let dest = self.dir.file_path(&file.name);
        std::fs::rename(&tmp, &dest)?;
        let downloaded = LogFile::new(file.name.clone(), std::fs::metadata(&dest)?.len())?;
        self.dir.first_event_ts(&downloaded, self.decoder)?;
        Ok(dest)
    }
}
