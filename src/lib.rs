//! Point-in-time recovery for MySQL databases
//!
//! Restores a logical backup into a side database, replays the binlog up to
//! a target time and swaps the result over the original. Also produces undo
//! SQL for a session's recent writes.
//!
//! # Quick Start
//!
//! ```ignore
//! use pitr::{Engine, EngineRegistry, PitrConfig, PitrRecovery, RecoveryRequest};
//!
//! let config = PitrConfig::from_file("pitr.toml".as_ref())?;
//! let registry = EngineRegistry::new().with_engine(Engine::MySql, my_driver_factory);
//! let recovery = PitrRecovery::from_registry(config, &registry)?;
//!
//! let request = RecoveryRequest::in_place("shop", target_ts, now_ts);
//! let outcome = recovery.recover(&request, &backups)?;
//! ```
//!
//! # Architecture
//!
//! - `pitr_core`: shared types, errors, naming and configuration
//! - `pitr_binlog`: parsing decoded binlog text and rollback synthesis
//! - `pitr_logs`: the local binlog cache, time resolution and `mysqlbinlog`
//! - `pitr_recovery`: the recovery state machine and its capabilities

pub use pitr_binlog;
pub use pitr_core;
pub use pitr_logs;
pub use pitr_recovery;

pub use pitr_core::{
    Backup, BackupKind, BackupStatus, BinlogInfo, Engine, LogCoordinate, LogFile, PitrConfig,
    PitrError, RecoveryRequest, RecoveryTarget, Result,
};
pub use pitr_recovery::{
    Capabilities, EngineRegistry, PitrRecovery, RecoveryOutcome, RecoveryProgress, RecoveryState,
    SqlConnection, SqlDriver,
};
