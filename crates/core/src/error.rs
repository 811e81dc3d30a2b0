//! Error types for point-in-time recovery
//!
//! Every failure the recovery core can report is a variant of [`PitrError`].
//! Variants carry the identifiers a caller needs to act on them (file names,
//! log offsets, table names, timestamps), so callers branch on the variant
//! instead of matching message text.
//!
//! Nothing in the core retries automatically. Use
//! [`PitrError::is_retryable_by_caller`] to tell whether the live database
//! is known to be untouched.

use std::io;
use thiserror::Error;

use crate::coordinate::LogCoordinate;

/// Result type alias for recovery operations
pub type Result<T> = std::result::Result<T, PitrError>;

/// Error kinds surfaced by the recovery core
#[derive(Debug, Error)]
pub enum PitrError {
    /// A decoded log event does not follow the textual dump grammar
    #[error("malformed log event at offset {position}: {reason}")]
    MalformedLogEvent {
        /// Offset from the `# at` marker of the event, 0 if unknown
        position: u64,
        /// What was wrong with the event
        reason: String,
    },

    /// A log file name is not `<base>.<number>`
    #[error("invalid binlog file name {name:?}")]
    InvalidLogFileName {
        /// The offending name
        name: String,
    },

    /// Two adjacent log files do not have consecutive sequence numbers
    #[error("discontinuous binlog files: {previous} is followed by {next}")]
    DiscontinuousLogFiles {
        /// Name of the file before the gap
        previous: String,
        /// Name of the file after the gap
        next: String,
    },

    /// No log file is available to resolve a coordinate from
    #[error("no local binlog files available in {dir}")]
    NoLogFiles {
        /// Directory that was searched
        dir: String,
    },

    /// Target time is earlier than the first event of the oldest retained log file
    #[error("target time {target_ts} is before the oldest retained binlog event at {earliest_ts}")]
    TargetBeforeRetainedHistory {
        /// Requested recovery time (unix seconds)
        target_ts: i64,
        /// First event time of the oldest retained file (unix seconds)
        earliest_ts: i64,
    },

    /// Target time is later than every recorded event
    #[error("target time {target_ts} is after the last event in {file}")]
    TargetAfterAllKnownEvents {
        /// Requested recovery time (unix seconds)
        target_ts: i64,
        /// Newest log file that was searched
        file: String,
    },

    /// No completed backup precedes the target coordinate
    #[error("no eligible backup at or before {target}")]
    NoEligibleBackup {
        /// Resolved target coordinate
        target: LogCoordinate,
    },

    /// The newest candidate backup exists but cannot be used
    #[error("backup {backup_id} cannot be used for recovery: {reason}")]
    BackupNotUsable {
        /// Identifier of the blocking backup
        backup_id: u64,
        /// Why it is blocking
        reason: String,
    },

    /// The table's current column list no longer matches a logged row
    #[error("schema drift on `{database}`.`{table}`: event row has {found} values, table has {expected} columns")]
    SchemaDriftDuringRollback {
        /// Database of the affected table
        database: String,
        /// Affected table
        table: String,
        /// Number of columns the table has now
        expected: usize,
        /// Number of values recorded in the event
        found: usize,
    },

    /// The decoder or database client failed or exited non-zero
    #[error("{tool} failed: {reason}")]
    ExternalToolFailure {
        /// Name of the tool (e.g. `mysqlbinlog`)
        tool: String,
        /// Exit status and captured stderr
        reason: String,
    },

    /// A statement or query failed on the database execution capability
    #[error("database error executing {statement:?}: {message}")]
    Database {
        /// Statement that failed, possibly abbreviated
        statement: String,
        /// Error reported by the server
        message: String,
    },

    /// The rename step of the swap failed; manual intervention is required
    #[error("swap of database {database} failed part-way: {reason}")]
    SwapPartialFailure {
        /// Original database being swapped
        database: String,
        /// Underlying failure
        reason: String,
    },

    /// The server is not configured for point-in-time recovery
    #[error("precondition failed: {reason}")]
    PreconditionFailed {
        /// Which check failed
        reason: String,
    },

    /// The decoded log text exceeded the configured limit
    #[error("decoded binlog text exceeds the size limit of {limit} bytes")]
    SizeLimitExceeded {
        /// The configured limit
        limit: u64,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Sidecar metadata could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PitrError {
    /// Create a parse error for the event at `position`
    pub fn malformed(position: u64, reason: impl Into<String>) -> Self {
        PitrError::MalformedLogEvent {
            position,
            reason: reason.into(),
        }
    }

    /// Create an external tool error
    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        PitrError::ExternalToolFailure {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Create a database execution error
    pub fn database(statement: impl AsRef<str>, message: impl Into<String>) -> Self {
        PitrError::Database {
            statement: abbreviate(statement.as_ref()),
            message: message.into(),
        }
    }

    /// Create a failed precondition error
    pub fn precondition(reason: impl Into<String>) -> Self {
        PitrError::PreconditionFailed {
            reason: reason.into(),
        }
    }

    /// Returns true if the live database is known to be untouched.
    ///
    /// Only a failed swap leaves the original database in an unknown state.
    pub fn is_retryable_by_caller(&self) -> bool {
        !matches!(self, PitrError::SwapPartialFailure { .. })
    }
}

const MAX_STATEMENT_IN_ERROR: usize = 200;

fn abbreviate(statement: &str) -> String {
    if statement.chars().count() <= MAX_STATEMENT_IN_ERROR {
        return statement.to_string();
    }
    let mut short: String = statement.chars().take(MAX_STATEMENT_IN_ERROR).collect();
    short.push_str("...");
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_malformed() {
        let err = PitrError::malformed(772, "missing @2");
        let msg = err.to_string();
        assert!(msg.contains("772"));
        assert!(msg.contains("missing @2"));
    }

    #[test]
    fn test_error_display_discontinuous() {
        let err = PitrError::DiscontinuousLogFiles {
            previous: "binlog.000001".into(),
            next: "binlog.000003".into(),
        };
        assert_eq!(
            err.to_string(),
            "discontinuous binlog files: binlog.000001 is followed by binlog.000003"
        );
    }

    #[test]
    fn test_database_error_abbreviates_long_statements() {
        let stmt = "INSERT INTO t VALUES ".to_string() + &"(1),".repeat(200);
        let err = PitrError::database(&stmt, "boom");
        match err {
            PitrError::Database { statement, .. } => {
                assert!(statement.ends_with("..."));
                assert_eq!(statement.chars().count(), MAX_STATEMENT_IN_ERROR + 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_only_swap_failure_is_not_retryable() {
        assert!(PitrError::tool("mysqlbinlog", "exit 1").is_retryable_by_caller());
        assert!(PitrError::NoEligibleBackup {
            target: LogCoordinate::new(1, 4)
        }
        .is_retryable_by_caller());
        assert!(!PitrError::SwapPartialFailure {
            database: "db".into(),
            reason: "rename failed".into(),
        }
        .is_retryable_by_caller());
    }

    #[test]
    fn test_io_error_converts() {
        let err: PitrError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, PitrError::Io(_)));
    }
}
