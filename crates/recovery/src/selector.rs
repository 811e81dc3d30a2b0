//! Backup selection
//!
//! Picks the newest backup whose recorded binlog coordinate is at or before
//! the target coordinate. Candidates are walked from newest to oldest:
//!
//! - a `Done` backup is selected
//! - a failed or pending `PitrSnapshot` backup stops the search, because it
//!   marks a former recovery's cutover and nothing older can be replayed
//!   across it
//! - any other unfinished backup is skipped
//!
//! Backups taken while binary logging was off carry no coordinate and are
//! never candidates.

use pitr_core::{Backup, BackupKind, BackupStatus, LogCoordinate, PitrError, Result};
use tracing::debug;

/// Chooses the restore source for a target coordinate
#[derive(Debug, Clone, Copy, Default)]
pub struct BackupSelector;

impl BackupSelector {
    /// Create a selector
    pub fn new() -> Self {
        BackupSelector
    }

    /// Latest usable backup at or before `target`
    pub fn select<'a>(&self, backups: &'a [Backup], target: LogCoordinate) -> Result<&'a Backup> {
        let mut candidates = Vec::with_capacity(backups.len());
        for backup in backups {
            if backup.binlog.is_empty() {
                debug!(backup_id = backup.id, name = %backup.name, "skipping backup without binlog position");
                continue;
            }
            candidates.push((backup.binlog.coordinate()?, backup));
        }
        // Newest first; ties keep input order
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        for (coordinate, backup) in candidates.into_iter().filter(|(c, _)| *c <= target) {
            match (backup.status, backup.kind) {
                (BackupStatus::Done, _) => {
                    debug!(backup_id = backup.id, %coordinate, %target, "selected backup");
                    return Ok(backup);
                }
                (BackupStatus::Failed, BackupKind::PitrSnapshot) => {
                    return Err(PitrError::BackupNotUsable {
                        backup_id: backup.id,
                        reason: format!(
                            "backup {} taken after a former recovery cutover failed; \
                             earlier points in time cannot be recovered",
                            backup.name
                        ),
                    });
                }
                (BackupStatus::Pending, BackupKind::PitrSnapshot) => {
                    return Err(PitrError::BackupNotUsable {
                        backup_id: backup.id,
                        reason: format!(
                            "backup {} taken after a former recovery cutover is still in progress",
                            backup.name
                        ),
                    });
                }
                _ => debug!(backup_id = backup.id, status = ?backup.status, "skipping unfinished backup"),
            }
        }
        Err(PitrError::NoEligibleBackup { target })
    }
}
