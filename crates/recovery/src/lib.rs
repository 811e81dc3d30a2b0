//! Point-in-time recovery against a live server
//!
//! - [`connection`]: the database execution capability
//! - [`registry`]: explicit engine driver registry
//! - [`preflight`]: server checks run before anything is written
//! - [`inventory`]: the server's own view of its binlog
//! - [`selector`]: choosing the backup to restore
//! - [`restore`]: executing a logical backup
//! - [`replay`]: streaming decoded binlog into the server
//! - [`swap`]: promoting the side database over the original
//! - [`orchestrator`]: the recovery state machine tying it together
//! - [`rollback_gen`]: undo SQL for one session's writes
//! - [`progress`]: byte counters a caller can poll
//! - [`testing`]: in-memory doubles for all capabilities

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod inventory;
pub mod orchestrator;
pub mod preflight;
pub mod progress;
pub mod registry;
pub mod replay;
pub mod restore;
pub mod rollback_gen;
pub mod selector;
pub mod swap;
pub mod testing;

pub use connection::{Row, SqlConnection, SqlDriver, TableInfo};
pub use orchestrator::{Capabilities, PitrRecovery, RecoveryOutcome, RecoveryPlan, RecoveryState};
pub use preflight::{IdentifierCase, ServerSettings};
pub use progress::{ProgressSnapshot, RecoveryProgress};
pub use registry::{DriverFactory, EngineRegistry};
pub use replay::{MysqlClientSink, ReplaySink};
pub use restore::{restore_backup, DumpStatements, RestoreStats};
pub use rollback_gen::RollbackGenerator;
pub use selector::BackupSelector;
pub use swap::{swap_databases, SwapOutcome, SwapPlan};
