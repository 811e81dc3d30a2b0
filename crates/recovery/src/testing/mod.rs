//! Test doubles for the recovery capabilities
//!
//! - [`InMemoryServer`]: a [`crate::SqlDriver`] over in-memory databases
//! - [`RecordingSink`]: a [`crate::ReplaySink`] that keeps what it was fed
//! - [`DirectoryFetcher`]: a [`pitr_logs::LogFetcher`] copying from a local directory
//!
//! The decoder doubles live in `pitr_logs::testing` and are re-exported here.

mod server;

use std::io::Read;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use pitr_core::{PitrError, Result};
use pitr_logs::LogFetcher;

use crate::replay::{ReplaySink, MYSQL};

pub use pitr_logs::testing::{DumpBuilder, ScriptedDecoder};
pub use server::{ExecutedStatement, InMemoryServer};

/// A [`ReplaySink`] that records every stream it is given
#[derive(Debug, Default)]
pub struct RecordingSink {
    replays: Mutex<Vec<String>>,
    failure: Mutex<Option<String>>,
}

impl RecordingSink {
    /// Sink that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every later replay like a client exiting with `message`
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    /// Text of each replay, in order
    pub fn replays(&self) -> Vec<String> {
        self.replays.lock().clone()
    }
}

impl ReplaySink for RecordingSink {
    fn apply(&self, input: &mut dyn Read) -> Result<u64> {
        let mut text = String::new();
        let bytes = input.read_to_string(&mut text)? as u64;
        if let Some(message) = self.failure.lock().clone() {
            return Err(PitrError::tool(MYSQL, message));
        }
        self.replays.lock().push(text);
        Ok(bytes)
    }
}

/// A [`LogFetcher`] that copies files out of a directory
#[derive(Debug)]
pub struct DirectoryFetcher {
    source: PathBuf,
    fetched: Mutex<Vec<String>>,
}

impl DirectoryFetcher {
    /// Serve files from `source`
    pub fn new(source: impl Into<PathBuf>) -> Self {
        DirectoryFetcher {
            source: source.into(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Names fetched so far
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

impl LogFetcher for DirectoryFetcher {
    fn fetch(&self, name: &str, dest: &Path) -> Result<u64> {
        let bytes = std::fs::copy(self.source.join(name), dest)?;
        self.fetched.lock().push(name.to_string());
        Ok(bytes)
    }
}
