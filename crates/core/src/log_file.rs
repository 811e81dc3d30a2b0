//! Binlog file names and sequence numbers
//!
//! Binlog files are named `<base>.<sequence>` where the sequence is
//! zero-padded to six digits until it outgrows the padding
//! (`binlog.999999` is followed by `binlog.1000000`). Sequences are always
//! compared numerically.

use serde::{Deserialize, Serialize};

use crate::error::{PitrError, Result};

/// One binlog file, local or remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFile {
    /// File name without directory
    pub name: String,
    /// Size in bytes at the time it was observed
    pub size: u64,
    /// Numeric suffix of `name`
    pub sequence: u64,
}

impl LogFile {
    /// Build a `LogFile`, parsing the sequence from `name`
    pub fn new(name: impl Into<String>, size: u64) -> Result<Self> {
        let name = name.into();
        let sequence = parse_binlog_name(&name)?;
        Ok(LogFile {
            name,
            size,
            sequence,
        })
    }

    /// Part of the name before the `.`, e.g. `binlog` for `binlog.000042`
    pub fn base_name(&self) -> &str {
        self.name.split('.').next().unwrap_or_default()
    }
}

/// Parse the numeric suffix of a binlog file name.
///
/// The name must contain exactly one `.` followed by base-10 digits.
pub fn parse_binlog_name(name: &str) -> Result<u64> {
    let invalid = || PitrError::InvalidLogFileName {
        name: name.to_string(),
    };
    let mut parts = name.split('.');
    let (Some(base), Some(suffix), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if base.is_empty() || suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    suffix.parse::<u64>().map_err(|_| invalid())
}

/// Generate binlog file names for the given sequences, e.g. `binlog.000007`
pub fn binlog_file_names(base: &str, sequences: impl IntoIterator<Item = u64>) -> Vec<String> {
    sequences
        .into_iter()
        .map(|seq| format!("{}.{:06}", base, seq))
        .collect()
}

/// Sort log files ascending by sequence number
pub fn sort_log_files(files: &mut [LogFile]) {
    files.sort_by_key(|f| f.sequence);
}

/// Verify that adjacent files have consecutive sequence numbers.
///
/// Empty and single-element lists pass.
pub fn check_contiguous(files: &[LogFile]) -> Result<()> {
    for pair in files.windows(2) {
        if pair[0].sequence.checked_add(1) != Some(pair[1].sequence) {
            return Err(PitrError::DiscontinuousLogFiles {
                previous: pair[0].name.clone(),
                next: pair[1].name.clone(),
            });
        }
    }
    Ok(())
}
