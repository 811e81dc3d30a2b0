//! Backups as seen by the recovery core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::coordinate::BinlogInfo;

/// Lifecycle state of a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    /// Still being taken
    Pending,
    /// Completed and usable
    Done,
    /// Failed while being taken
    Failed,
}

/// Why a backup was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    /// Requested by a user
    Manual,
    /// Taken on a schedule
    Automatic,
    /// Taken right after a recovery swapped databases
    PitrSnapshot,
}

/// A full logical backup plus the binlog position it is consistent with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    /// Backup identifier
    pub id: u64,
    /// Human readable name
    pub name: String,
    /// Lifecycle state
    pub status: BackupStatus,
    /// Why it was taken
    pub kind: BackupKind,
    /// Binlog position at backup time; empty when binlog was off
    pub binlog: BinlogInfo,
    /// Location of the dump (SQL statements)
    pub payload: PathBuf,
}

impl Backup {
    /// Create a completed manual backup
    pub fn done(id: u64, binlog: BinlogInfo, payload: impl Into<PathBuf>) -> Self {
        Backup {
            id,
            name: format!("backup-{}", id),
            status: BackupStatus::Done,
            kind: BackupKind::Manual,
            binlog,
            payload: payload.into(),
        }
    }

    /// Set the status
    pub fn with_status(mut self, status: BackupStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the kind
    pub fn with_kind(mut self, kind: BackupKind) -> Self {
        self.kind = kind;
        self
    }
}
