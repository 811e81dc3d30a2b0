//! Recovery requests

use serde::{Deserialize, Serialize};

/// Where the recovered data ends up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryTarget {
    /// Recover into a side database and swap it over the original
    InPlace,
    /// Recover into a fresh database with this name, leaving the original alone
    NewDatabase(String),
}

/// A request to bring a database back to its state at `target_ts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRequest {
    /// Database to recover
    pub database: String,
    /// Point in time to recover to (unix seconds, exclusive)
    pub target_ts: i64,
    /// Uniqueness suffix for the side and retired database names
    pub suffix_ts: i64,
    /// Destination of the recovered data
    pub target: RecoveryTarget,
}

impl RecoveryRequest {
    /// In-place recovery of `database` to `target_ts`
    pub fn in_place(database: impl Into<String>, target_ts: i64, suffix_ts: i64) -> Self {
        RecoveryRequest {
            database: database.into(),
            target_ts,
            suffix_ts,
            target: RecoveryTarget::InPlace,
        }
    }

    /// Recovery of `database` into a new database `name`
    pub fn into_new_database(
        database: impl Into<String>,
        name: impl Into<String>,
        target_ts: i64,
        suffix_ts: i64,
    ) -> Self {
        RecoveryRequest {
            database: database.into(),
            target_ts,
            suffix_ts,
            target: RecoveryTarget::NewDatabase(name.into()),
        }
    }
}
