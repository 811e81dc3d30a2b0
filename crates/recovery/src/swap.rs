//! Promoting the side database over the original
//!
//! Runs on one administrative session with `sql_log_bin` off, so the swap
//! itself never reaches the binlog:
//!
//! 1. create the original database if it was dropped
//! 2. list the tables of both databases; if both are empty there is nothing
//!    to move and the swap is done
//! 3. recreate the retired database
//! 4. one `RENAME TABLE` moving original tables into the retired database
//!    and side tables into the original
//!
//! A multi-table rename is not atomic on every engine. If step 4 fails the
//! databases may be half swapped, and the error says so.

use pitr_core::naming::quote_identifier;
use pitr_core::{PitrError, Result};
use tracing::{debug, error, info, warn};

use crate::connection::{database_exists, list_tables, SqlConnection, TableInfo};

/// Databases involved in a swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    /// Database being recovered
    pub original: String,
    /// Database holding the recovered tables
    pub side: String,
    /// Database receiving the pre-recovery tables
    pub retired: String,
}

/// What a swap did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapOutcome {
    /// Retired database, `None` when there was nothing to move
    pub retired: Option<String>,
    /// Tables moved out of the original database
    pub retired_tables: Vec<String>,
    /// Tables moved into the original database
    pub promoted_tables: Vec<String>,
}

/// The `RENAME TABLE` statement for a swap
pub fn rename_statement(plan: &SwapPlan, original_tables: &[String], side_tables: &[String]) -> String {
    let moves = |from: &str, to: &str, tables: &[String]| -> Vec<String> {
        tables
            .iter()
            .map(|t| {
                format!(
                    "{}.{} TO {}.{}",
                    quote_identifier(from),
                    quote_identifier(t),
                    quote_identifier(to),
                    quote_identifier(t)
                )
            })
            .collect()
    };
    let mut renames = moves(&plan.original, &plan.retired, original_tables);
    renames.extend(moves(&plan.side, &plan.original, side_tables));
    format!("RENAME TABLE {}", renames.join(", "))
}

/// Swap `plan.side` over `plan.original` on `conn`.
///
/// `sql_log_bin` is turned back on whether or not the swap succeeds. A swap
/// failure takes precedence over a failure to re-enable logging.
pub fn swap_databases(conn: &mut dyn SqlConnection, plan: &SwapPlan) -> Result<SwapOutcome> {
    let exists = database_exists(conn, &plan.original)?;

    debug!("turning sql_log_bin off for the swap session");
    conn.execute("SET sql_log_bin=OFF")?;
    let swapped = swap_tables(conn, plan, exists);
    let restored = conn.execute("SET sql_log_bin=ON");

    match (swapped, restored) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(e)) => {
            error!(error = %e, "swap done but sql_log_bin could not be turned back on");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore_err)) => {
            error!(error = %restore_err, "could not turn sql_log_bin back on after a failed swap");
            Err(e)
        }
    }
}

fn swap_tables(conn: &mut dyn SqlConnection, plan: &SwapPlan, original_exists: bool) -> Result<SwapOutcome> {
    if !original_exists {
        info!(database = %plan.original, "original database is missing, creating it");
        conn.execute(&format!("CREATE DATABASE {}", quote_identifier(&plan.original)))?;
    }

    let names = |tables: Vec<TableInfo>| -> Vec<String> {
        tables.into_iter().map(|t| t.name).collect()
    };
    let original_tables = names(list_tables(conn, &plan.original)?);
    let side_tables = names(list_tables(conn, &plan.side)?);

    if original_tables.is_empty() && side_tables.is_empty() {
        warn!(
            original = %plan.original,
            side = %plan.side,
            "both databases are empty, nothing to swap"
        );
        return Ok(SwapOutcome::default());
    }

    let retired = quote_identifier(&plan.retired);
    conn.execute(&format!("DROP DATABASE IF EXISTS {}", retired))?;
    conn.execute(&format!("CREATE DATABASE {}", retired))?;

    let statement = rename_statement(plan, &original_tables, &side_tables);
    debug!(statement = %statement, "renaming tables");
    conn.execute(&statement)
        .map_err(|e| PitrError::SwapPartialFailure {
            database: plan.original.clone(),
            reason: e.to_string(),
        })?;

    info!(
        original = %plan.original,
        retired = %plan.retired,
        moved_out = original_tables.len(),
        moved_in = side_tables.len(),
        "swapped databases"
    );
    Ok(SwapOutcome {
        retired: Some(plan.retired.clone()),
        retired_tables: original_tables,
        promoted_tables: side_tables,
    })
}
