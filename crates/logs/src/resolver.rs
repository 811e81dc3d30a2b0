//! Mapping a wall-clock time to a binlog coordinate
//!
//! Resolution happens in two steps:
//!
//! 1. Pick the file: the one whose first event time is the last value
//!    still before the target. Scan forward until a file starts at or after
//!    the target and take the file before it. If no file does, take the
//!    newest file and remember that nothing comes after it.
//! 2. Pick the offset: decode that file from the target time on and take the
//!    first real event. If there is none, the target lies beyond the file:
//!    its end is the coordinate, unless it was the newest file, in which case
//!    the target is in the future.

use pitr_core::{LogCoordinate, PitrError, Result};
use tracing::debug;

use crate::decoder::{event_position_at_or_after, LogDecoder};
use crate::registry::{IndexedLogFile, LogDirectory};

/// Which file a target time falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSelection {
    /// Index into the indexed file list
    pub index: usize,
    /// True if the file is the newest one and no later file starts after the target
    pub is_last: bool,
}

/// Choose the file for `target_ts` among contiguous, sorted files
pub fn select_file(files: &[IndexedLogFile], target_ts: i64) -> Result<FileSelection> {
    let Some(oldest) = files.first() else {
        return Err(PitrError::NoLogFiles {
            dir: String::new(),
        });
    };
    match files.iter().position(|f| f.first_event_ts >= target_ts) {
        Some(0) => Err(PitrError::TargetBeforeRetainedHistory {
            target_ts,
            earliest_ts: oldest.first_event_ts,
        }),
        Some(i) => Ok(FileSelection {
            index: i - 1,
            is_last: false,
        }),
        None => Ok(FileSelection {
            index: files.len() - 1,
            is_last: true,
        }),
    }
}

/// Resolves target times against a local log directory
pub struct CoordinateResolver<'a> {
    dir: &'a LogDirectory,
    decoder: &'a dyn LogDecoder,
}

impl<'a> CoordinateResolver<'a> {
    /// Resolver over `dir`, decoding with `decoder`
    pub fn new(dir: &'a LogDirectory, decoder: &'a dyn LogDecoder) -> Self {
        CoordinateResolver { dir, decoder }
    }

    /// Coordinate of the first event at or after `target_ts`
    pub fn resolve(&self, target_ts: i64) -> Result<LogCoordinate> {
        let files = self.dir.indexed_files(self.decoder)?;
        if files.is_empty() {
            return Err(PitrError::NoLogFiles {
                dir: self.dir.path().display().to_string(),
            });
        }
        let selection = select_file(&files, target_ts)?;
        let file = &files[selection.index].file;

        let path = self.dir.file_path(&file.name);
        let coordinate = match event_position_at_or_after(self.decoder, path, target_ts)? {
            Some(offset) => LogCoordinate::new(file.sequence, offset),
            None if selection.is_last => {
                return Err(PitrError::TargetAfterAllKnownEvents {
                    target_ts,
                    file: file.name.clone(),
                });
            }
            None => LogCoordinate::end_of(file.sequence),
        };
        debug!(target_ts, file = %file.name, %coordinate, "resolved target time");
        Ok(coordinate)
    }
}
