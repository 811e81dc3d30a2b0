//! Core types for point-in-time recovery
//!
//! This crate defines the vocabulary shared by the rest of the workspace:
//! - `PitrError`: the closed set of failure kinds
//! - `LogFile`, `LogCoordinate`, `BinlogInfo`: positions in the binlog stream
//! - `Backup`, `RecoveryRequest`: inputs to a recovery
//! - Naming helpers for side and retired databases
//! - `Engine` identifier limits and `PitrConfig`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backup;
pub mod config;
pub mod coordinate;
pub mod engine;
pub mod error;
pub mod log_file;
pub mod naming;
pub mod request;
pub mod time;

pub use backup::{Backup, BackupKind, BackupStatus};
pub use config::{ConnectionConfig, PitrConfig, RecoveryConfig, StorageConfig, ToolsConfig};
pub use coordinate::{BinlogInfo, LogCoordinate};
pub use engine::Engine;
pub use error::{PitrError, Result};
pub use log_file::{binlog_file_names, check_contiguous, parse_binlog_name, sort_log_files, LogFile};
pub use request::{RecoveryRequest, RecoveryTarget};
