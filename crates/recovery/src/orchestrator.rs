//! Recovery orchestrator
//!
//! Recovery runs in two halves:
//! 1. Plan: pre-flight checks, binlog sync, resolve the target time to a
//!    coordinate, select a backup, collect the replay files
//! 2. Execute: restore the backup into the side database, replay the binlog
//!    up to the target time, swap the side database over the original
//!
//! Nothing before the swap touches the original database, so any failure
//! up to that point leaves it as it was. The side database is left in place
//! for inspection.
//!
//! # Example
//!
//! ```ignore
//! let registry = EngineRegistry::new().with_engine(Engine::MySql, open_driver);
//! let recovery = PitrRecovery::from_registry(config, &registry)?;
//! let outcome = recovery.recover(&RecoveryRequest::in_place("shop", target_ts, now), &backups)?;
//! println!("old tables kept in {:?}", outcome.retired_database);
//! ```

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use pitr_core::naming::{pitr_database_name, quote_identifier, retired_database_name};
use pitr_core::{
    Backup, BinlogInfo, Engine, LogCoordinate, PitrConfig, PitrError, RecoveryRequest,
    RecoveryTarget, Result,
};
use pitr_logs::{CoordinateResolver, DecodeRequest, LogDecoder, LogDirectory, LogFetcher, LogSync, MysqlBinlog, SyncReport};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::connection::{database_exists, list_tables, SqlConnection, SqlDriver};
use crate::inventory::{binlog_position, remote_inventory};
use crate::preflight::{self, ServerSettings};
use crate::progress::RecoveryProgress;
use crate::registry::EngineRegistry;
use crate::replay::{replay, MysqlClientSink, ReplaySink};
use crate::restore::restore_backup;
use crate::rollback_gen::{load_catalog, RollbackGenerator};
use crate::selector::BackupSelector;
use crate::swap::{swap_databases, SwapPlan};

/// Where a recovery is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    /// No recovery has started
    Idle,
    /// Resolving the target and choosing a backup
    SelectingBackup,
    /// Executing the backup into the side database
    RestoringBackup,
    /// Replaying the binlog into the side database
    ReplayingLog,
    /// Moving tables between the databases
    SwappingDatabases,
    /// Finished
    Done,
    /// Stopped with an error
    Failed,
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryState::Idle => "idle",
            RecoveryState::SelectingBackup => "selecting_backup",
            RecoveryState::RestoringBackup => "restoring_backup",
            RecoveryState::ReplayingLog => "replaying_log",
            RecoveryState::SwappingDatabases => "swapping_databases",
            RecoveryState::Done => "done",
            RecoveryState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// External collaborators of a recovery
#[derive(Clone)]
pub struct Capabilities {
    /// Opens database sessions
    pub driver: Arc<dyn SqlDriver>,
    /// Renders binlog files as text
    pub decoder: Arc<dyn LogDecoder>,
    /// Downloads binlog files from the server
    pub fetcher: Arc<dyn LogFetcher>,
    /// Executes replayed text
    pub sink: Arc<dyn ReplaySink>,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

/// Everything decided before the first write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPlan {
    /// Backup to restore
    pub backup: Backup,
    /// Coordinate of the first event at or after the target time
    pub target: LogCoordinate,
    /// Binlog files from the backup's file through the target's file
    pub replay_files: Vec<PathBuf>,
    /// Database receiving the restore and replay
    pub side_database: String,
    /// Database receiving the original tables; `None` without a swap
    pub retired_database: Option<String>,
    /// Name of the original database inside row events
    pub binlog_database: String,
}

/// Result of a successful recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryOutcome {
    /// Backup that was restored
    pub backup_id: u64,
    /// Resolved target coordinate
    pub target: LogCoordinate,
    /// Database now holding the recovered data
    pub recovered_database: String,
    /// Database holding the pre-recovery tables, if a swap moved any
    pub retired_database: Option<String>,
    /// Decoded binlog bytes replayed
    pub replayed_bytes: u64,
}

/// Point-in-time recovery for one server
pub struct PitrRecovery {
    config: PitrConfig,
    engine: Engine,
    capabilities: Capabilities,
    dir: LogDirectory,
    progress: Arc<RecoveryProgress>,
    state: Mutex<RecoveryState>,
}

impl fmt::Debug for PitrRecovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PitrRecovery")
            .field("engine", &self.engine)
            .field("binlog_dir", &self.dir.path())
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl PitrRecovery {
    /// Recovery over explicit capabilities
    pub fn new(config: PitrConfig, capabilities: Capabilities) -> Result<Self> {
        config.validate()?;
        let engine = config.engine()?;
        let dir = LogDirectory::new(config.storage.binlog_dir.clone());
        Ok(PitrRecovery {
            config,
            engine,
            capabilities,
            dir,
            progress: Arc::new(RecoveryProgress::new()),
            state: Mutex::new(RecoveryState::Idle),
        })
    }

    /// Recovery using the registered driver for the configured engine and
    /// the `mysqlbinlog` and `mysql` tools
    pub fn from_registry(config: PitrConfig, registry: &EngineRegistry) -> Result<Self> {
        let engine = config.engine()?;
        let driver = registry.driver(engine, &config.connection)?;
        let binlog = Arc::new(MysqlBinlog::new(&config.tools, config.connection.clone()));
        let sink = Arc::new(MysqlClientSink::new(&config.tools, config.connection.clone()));
        let capabilities = Capabilities {
            driver,
            decoder: binlog.clone(),
            fetcher: binlog,
            sink,
        };
        Self::new(config, capabilities)
    }

    /// Share `progress` with the caller instead of a private counter
    pub fn with_progress(mut self, progress: Arc<RecoveryProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Progress counters of the current or last recovery
    pub fn progress(&self) -> Arc<RecoveryProgress> {
        Arc::clone(&self.progress)
    }

    /// Current state
    pub fn state(&self) -> RecoveryState {
        *self.state.lock()
    }

    /// Configuration in use
    pub fn config(&self) -> &PitrConfig {
        &self.config
    }

    /// Local binlog cache
    pub fn log_directory(&self) -> &LogDirectory {
        &self.dir
    }

    fn connect(&self, database: Option<&str>) -> Result<Box<dyn SqlConnection>> {
        self.capabilities.driver.connect(database)
    }

    fn transition(&self, next: RecoveryState) {
        let mut state = self.state.lock();
        info!(from = %*state, to = %next, "recovery state");
        *state = next;
    }

    /// Check that the server can recover `database`
    pub fn check_preconditions(&self, database: &str) -> Result<ServerSettings> {
        let mut conn = self.connect(None)?;
        preflight::check(conn.as_mut(), database)
    }

    /// Bring the local binlog cache in line with the server
    pub fn sync_logs(&self) -> Result<SyncReport> {
        let remote = {
            let mut conn = self.connect(None)?;
            remote_inventory(conn.as_mut())?
        };
        let report = LogSync::new(
            &self.dir,
            self.capabilities.fetcher.as_ref(),
            self.capabilities.decoder.as_ref(),
        )
        .download_latest(self.config.recovery.download_latest)
        .sync(&remote)?;
        info!(
            downloaded = report.downloaded.len(),
            replaced = report.replaced.len(),
            kept = report.kept.len(),
            "synced binlog files"
        );
        Ok(report)
    }

    /// Coordinate of the first event at or after `target_ts` in the local cache
    pub fn resolve(&self, target_ts: i64) -> Result<LogCoordinate> {
        CoordinateResolver::new(&self.dir, self.capabilities.decoder.as_ref()).resolve(target_ts)
    }

    /// Current binlog write position, for recording with a new backup
    pub fn current_binlog_info(&self) -> Result<BinlogInfo> {
        let mut conn = self.connect(None)?;
        binlog_position(conn.as_mut())
    }

    fn side_database(&self, request: &RecoveryRequest) -> Result<String> {
        let max_len = self.engine.max_identifier_len();
        match &request.target {
            RecoveryTarget::InPlace => pitr_database_name(&request.database, request.suffix_ts, max_len),
            RecoveryTarget::NewDatabase(name) => {
                if name.is_empty() || name.chars().count() > max_len {
                    return Err(PitrError::Config(format!(
                        "new database name {:?} must have 1 to {} characters",
                        name, max_len
                    )));
                }
                if *name == request.database {
                    return Err(PitrError::Config(format!(
                        "new database name must differ from {}",
                        request.database
                    )));
                }
                Ok(name.clone())
            }
        }
    }

    /// Decide everything a recovery needs without writing to the server.
    ///
    /// Syncs the binlog cache first so the newest events are visible.
    pub fn plan(&self, request: &RecoveryRequest, backups: &[Backup]) -> Result<RecoveryPlan> {
        if request.database.is_empty() {
            return Err(PitrError::Config("database name must not be empty".into()));
        }
        let side_database = self.side_database(request)?;
        let settings = self.check_preconditions(&request.database)?;
        self.sync_logs()?;

        let target = self.resolve(request.target_ts)?;
        let backup = BackupSelector::new().select(backups, target)?.clone();
        let start = backup.binlog.coordinate()?;
        let replay_files = self.dir.replay_files(start.sequence, target.sequence)?;

        let retired_database = match request.target {
            RecoveryTarget::InPlace => Some(retired_database_name(
                &request.database,
                request.suffix_ts,
                self.engine.max_identifier_len(),
            )?),
            RecoveryTarget::NewDatabase(_) => None,
        };
        let plan = RecoveryPlan {
            backup,
            target,
            replay_files,
            side_database,
            retired_database,
            binlog_database: settings.identifier_case.binlog_name(&request.database),
        };
        debug!(
            backup_id = plan.backup.id,
            target = %plan.target,
            files = plan.replay_files.len(),
            side = %plan.side_database,
            "planned recovery"
        );
        Ok(plan)
    }

    /// Recover `request.database` to `request.target_ts` from the best of `backups`
    pub fn recover(&self, request: &RecoveryRequest, backups: &[Backup]) -> Result<RecoveryOutcome> {
        self.progress.reset();
        info!(
            database = %request.database,
            target_ts = request.target_ts,
            suffix_ts = request.suffix_ts,
            "starting point-in-time recovery"
        );
        let result = self.run(request, backups);
        match &result {
            Ok(outcome) => {
                self.transition(RecoveryState::Done);
                info!(
                    database = %outcome.recovered_database,
                    backup_id = outcome.backup_id,
                    retired = ?outcome.retired_database,
                    "recovery finished"
                );
            }
            Err(e) => {
                let failed_in = self.state();
                self.transition(RecoveryState::Failed);
                error!(
                    database = %request.database,
                    state = %failed_in,
                    error = %e,
                    retryable = e.is_retryable_by_caller(),
                    "recovery failed"
                );
            }
        }
        result
    }

    fn run(&self, request: &RecoveryRequest, backups: &[Backup]) -> Result<RecoveryOutcome> {
        self.transition(RecoveryState::SelectingBackup);
        let plan = self.plan(request, backups)?;

        self.transition(RecoveryState::RestoringBackup);
        self.restore(&plan)?;

        self.transition(RecoveryState::ReplayingLog);
        let replayed_bytes = self.replay(request, &plan)?;

        let retired_database = match &plan.retired_database {
            Some(retired) => {
                self.transition(RecoveryState::SwappingDatabases);
                let swap = SwapPlan {
                    original: request.database.clone(),
                    side: plan.side_database.clone(),
                    retired: retired.clone(),
                };
                let mut conn = self.connect(None)?;
                swap_databases(conn.as_mut(), &swap)?.retired
            }
            None => None,
        };

        let recovered_database = match &request.target {
            RecoveryTarget::InPlace => request.database.clone(),
            RecoveryTarget::NewDatabase(name) => name.clone(),
        };
        Ok(RecoveryOutcome {
            backup_id: plan.backup.id,
            target: plan.target,
            recovered_database,
            retired_database,
            replayed_bytes,
        })
    }

    fn restore(&self, plan: &RecoveryPlan) -> Result<()> {
        let side = &plan.side_database;
        {
            let mut admin = self.connect(None)?;
            if database_exists(admin.as_mut(), side)? {
                let tables = list_tables(admin.as_mut(), side)?;
                if !tables.is_empty() {
                    return Err(PitrError::precondition(format!(
                        "database {} already has {} tables",
                        side,
                        tables.len()
                    )));
                }
            } else {
                admin.execute(&format!("CREATE DATABASE {}", quote_identifier(side)))?;
            }
        }

        let payload = File::open(&plan.backup.payload)?;
        self.progress.set_restore_total(payload.metadata()?.len());
        info!(backup_id = plan.backup.id, database = %side, "restoring backup");
        let mut conn = self.connect(Some(side))?;
        restore_backup(conn.as_mut(), BufReader::new(self.progress.restore_reader(payload)))?;
        Ok(())
    }

    fn replay(&self, request: &RecoveryRequest, plan: &RecoveryPlan) -> Result<u64> {
        let mut total = 0;
        for path in &plan.replay_files {
            total += std::fs::metadata(path)?.len();
        }
        self.progress.set_replay_total(total);

        let decode = DecodeRequest::for_files(plan.replay_files.iter().cloned())
            .rewrite_database(plan.binlog_database.clone(), plan.side_database.clone())
            .start_at_position(plan.backup.binlog.position)
            .stop_before_time(request.target_ts)
            .for_replay();
        replay(
            self.capabilities.decoder.as_ref(),
            self.capabilities.sink.as_ref(),
            &decode,
            &self.progress,
        )
    }

    /// Drop the database a former in-place recovery retired
    pub fn delete_retired_database(&self, database: &str, suffix_ts: i64) -> Result<String> {
        let retired = retired_database_name(database, suffix_ts, self.engine.max_identifier_len())?;
        let mut conn = self.connect(None)?;
        conn.execute(&format!("DROP DATABASE IF EXISTS {}", quote_identifier(&retired)))?;
        info!(database = %retired, "dropped retired database");
        Ok(retired)
    }

    /// Rollback SQL for the writes of connection `thread_id` between two
    /// positions of the cached binlog files `file_names`
    pub fn generate_rollback(
        &self,
        file_names: &[String],
        start_pos: u64,
        stop_pos: u64,
        thread_id: &str,
    ) -> Result<String> {
        let files: Vec<PathBuf> = file_names.iter().map(|n| self.dir.file_path(n)).collect();
        let generator = RollbackGenerator::new(
            self.capabilities.decoder.as_ref(),
            self.config.recovery.rollback_size_limit,
        );
        let txns = generator.transactions(&files, start_pos, stop_pos, thread_id)?;
        let mut conn = self.connect(None)?;
        let catalog = load_catalog(conn.as_mut(), &txns)?;
        pitr_binlog::rollback_sql(&txns, &catalog)
    }
}
