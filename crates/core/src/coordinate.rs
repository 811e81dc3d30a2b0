//! Positions in the binlog stream

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::log_file::parse_binlog_name;

/// A `(sequence, offset)` position in the binlog stream.
///
/// Ordered by sequence first, then offset. Field order matters for the
/// derived `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogCoordinate {
    /// Numeric suffix of the log file name
    pub sequence: u64,
    /// Byte offset inside that file
    pub offset: u64,
}

impl LogCoordinate {
    /// Offset meaning "the whole file and continue into the next one"
    pub const END_OF_FILE: u64 = i64::MAX as u64;

    /// Create a coordinate
    pub const fn new(sequence: u64, offset: u64) -> Self {
        LogCoordinate { sequence, offset }
    }

    /// Coordinate at the end of file `sequence`
    pub const fn end_of(sequence: u64) -> Self {
        LogCoordinate::new(sequence, Self::END_OF_FILE)
    }

    /// True if this coordinate covers all of its file
    pub fn is_end_of_file(&self) -> bool {
        self.offset == Self::END_OF_FILE
    }
}

impl fmt::Display for LogCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end_of_file() {
            write!(f, "({}, end)", self.sequence)
        } else {
            write!(f, "({}, {})", self.sequence, self.offset)
        }
    }
}

/// Binlog position as reported by `SHOW MASTER STATUS` when a backup was taken.
///
/// An empty file name means binary logging was off at backup time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinlogInfo {
    /// Log file name, e.g. `binlog.000042`
    pub file_name: String,
    /// Byte offset in that file
    pub position: u64,
}

impl BinlogInfo {
    /// Create a binlog position
    pub fn new(file_name: impl Into<String>, position: u64) -> Self {
        BinlogInfo {
            file_name: file_name.into(),
            position,
        }
    }

    /// True if no binlog position was recorded
    pub fn is_empty(&self) -> bool {
        self.file_name.is_empty()
    }

    /// Convert to a numeric coordinate
    pub fn coordinate(&self) -> Result<LogCoordinate> {
        let sequence = parse_binlog_name(&self.file_name)?;
        Ok(LogCoordinate::new(sequence, self.position))
    }
}
