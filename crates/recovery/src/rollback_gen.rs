//! Rollback SQL for one session's recent writes
//!
//! Decodes a window of binlog files with row images, keeps the transactions
//! of one connection thread that changed rows, and inverts them latest first.
//! Column names come from the server's current schema.

use std::collections::BTreeSet;
use std::io::BufReader;
use std::path::PathBuf;

use pitr_binlog::{rollback_sql, transactions_for_thread, StreamSplitter, TableCatalog, Transaction};
use pitr_core::{PitrError, Result};
use pitr_logs::{DecodeRequest, LogDecoder};
use tracing::{debug, info};

use crate::connection::{table_columns, SqlConnection};

/// Builds rollback SQL from binlog files
pub struct RollbackGenerator<'a> {
    decoder: &'a dyn LogDecoder,
    size_limit: u64,
}

impl<'a> RollbackGenerator<'a> {
    /// Generator decoding with `decoder`, accepting at most `size_limit` bytes of text
    pub fn new(decoder: &'a dyn LogDecoder, size_limit: u64) -> Self {
        RollbackGenerator {
            decoder,
            size_limit,
        }
    }

    /// Transactions of `thread_id` with row changes between the two positions
    pub fn transactions(
        &self,
        files: &[PathBuf],
        start_pos: u64,
        stop_pos: u64,
        thread_id: &str,
    ) -> Result<Vec<Transaction>> {
        if files.is_empty() {
            return Err(PitrError::Config("no binlog files to generate rollback from".into()));
        }
        let request = DecodeRequest::for_files(files.iter().cloned())
            .start_at_position(start_pos)
            .stop_at_position(stop_pos)
            .with_row_images();
        let mut stream = self.decoder.decode(&request)?;
        let splitter = StreamSplitter::new().with_size_limit(self.size_limit);
        let split = splitter.split(BufReader::new(&mut stream));
        let txns = match split {
            Ok(txns) => {
                stream.finish()?;
                txns
            }
            Err(e) => {
                stream.abort();
                return Err(e);
            }
        };
        let total = txns.len();
        let kept = transactions_for_thread(txns, thread_id)?;
        debug!(thread_id, total, kept = kept.len(), "filtered transactions");
        Ok(kept)
    }

    /// Rollback SQL for `thread_id`'s writes, latest transaction first
    pub fn generate(
        &self,
        files: &[PathBuf],
        start_pos: u64,
        stop_pos: u64,
        thread_id: &str,
        catalog: &TableCatalog,
    ) -> Result<String> {
        let txns = self.transactions(files, start_pos, stop_pos, thread_id)?;
        let sql = rollback_sql(&txns, catalog)?;
        info!(thread_id, transactions = txns.len(), "generated rollback SQL");
        Ok(sql)
    }
}

/// Tables touched by the row events of `txns`
pub fn touched_tables(txns: &[Transaction]) -> Result<BTreeSet<(String, String)>> {
    let mut tables = BTreeSet::new();
    for txn in txns {
        for event in &txn.events {
            if let Some(rows) = event.rows()? {
                tables.insert((rows.database, rows.table));
            }
        }
    }
    Ok(tables)
}

/// Current columns of every table `txns` touched. Missing tables get an
/// empty column list, so their rows are reported as schema drift.
pub fn load_catalog(conn: &mut dyn SqlConnection, txns: &[Transaction]) -> Result<TableCatalog> {
    let mut catalog = TableCatalog::new();
    for (database, table) in touched_tables(txns)? {
        let columns = table_columns(conn, &database, &table)?;
        catalog.insert(database, table, columns);
    }
    Ok(catalog)
}
