//! Rollback SQL synthesis
//!
//! Inverts the DML events of a transaction, latest effect first:
//!
//! - INSERT becomes DELETE keyed on the inserted values
//! - DELETE becomes INSERT of the deleted values
//! - UPDATE becomes UPDATE with the before and after images swapped
//!
//! Row images are positional, so the caller supplies each table's current
//! column names. A row whose value count differs from the column count means
//! the schema changed since the event was logged; that is reported, never
//! papered over.

use std::collections::HashMap;
use std::fmt;

use pitr_core::naming::quote_identifier;
use pitr_core::{PitrError, Result};

use crate::rows::{DmlKind, RowsEvent};
use crate::stream::Transaction;

/// Current column names per table
#[derive(Debug, Clone, Default)]
pub struct TableCatalog {
    tables: HashMap<(String, String), Vec<String>>,
}

impl TableCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the columns of `database`.`table` in ordinal order
    pub fn insert(
        &mut self,
        database: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) {
        self.tables.insert(
            (database.into(), table.into()),
            columns.into_iter().map(Into::into).collect(),
        );
    }

    /// Builder form of [`TableCatalog::insert`]
    pub fn with_table(
        mut self,
        database: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.insert(database, table, columns);
        self
    }

    /// Columns of `database`.`table`
    pub fn columns(&self, database: &str, table: &str) -> Option<&[String]> {
        self.tables
            .get(&(database.to_string(), table.to_string()))
            .map(Vec::as_slice)
    }
}

/// One synthesized statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackStatement {
    /// Undo of an inserted row
    Delete {
        /// Database
        database: String,
        /// Table
        table: String,
        /// Column equality predicate
        predicate: Vec<(String, String)>,
    },
    /// Undo of a deleted row
    Insert {
        /// Database
        database: String,
        /// Table
        table: String,
        /// Column names in ordinal order
        columns: Vec<String>,
        /// Values matching `columns`
        values: Vec<String>,
    },
    /// Undo of an updated row
    Update {
        /// Database
        database: String,
        /// Table
        table: String,
        /// New values (the original before image)
        assignments: Vec<(String, String)>,
        /// Row to change (the original after image)
        predicate: Vec<(String, String)>,
    },
}

fn write_predicate(f: &mut fmt::Formatter<'_>, predicate: &[(String, String)]) -> fmt::Result {
    for (i, (column, value)) in predicate.iter().enumerate() {
        if i > 0 {
            f.write_str(" AND ")?;
        }
        if value == "NULL" {
            write!(f, "{} IS NULL", quote_identifier(column))?;
        } else {
            write!(f, "{}={}", quote_identifier(column), value)?;
        }
    }
    Ok(())
}

impl fmt::Display for RollbackStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackStatement::Delete {
                database,
                table,
                predicate,
            } => {
                write!(
                    f,
                    "DELETE FROM {}.{} WHERE ",
                    quote_identifier(database),
                    quote_identifier(table)
                )?;
                write_predicate(f, predicate)?;
                f.write_str(" LIMIT 1;")
            }
            RollbackStatement::Insert {
                database,
                table,
                columns,
                values,
            } => {
                let columns: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
                write!(
                    f,
                    "INSERT INTO {}.{} ({}) VALUES ({});",
                    quote_identifier(database),
                    quote_identifier(table),
                    columns.join(", "),
                    values.join(", ")
                )
            }
            RollbackStatement::Update {
                database,
                table,
                assignments,
                predicate,
            } => {
                let assignments: Vec<String> = assignments
                    .iter()
                    .map(|(c, v)| format!("{}={}", quote_identifier(c), v))
                    .collect();
                write!(
                    f,
                    "UPDATE {}.{} SET {} WHERE ",
                    quote_identifier(database),
                    quote_identifier(table),
                    assignments.join(", ")
                )?;
                write_predicate(f, predicate)?;
                f.write_str(" LIMIT 1;")
            }
        }
    }
}

fn pair(columns: &[String], values: &[String]) -> Vec<(String, String)> {
    columns.iter().cloned().zip(values.iter().cloned()).collect()
}

fn checked_columns<'c>(
    catalog: &'c TableCatalog,
    rows: &RowsEvent,
    row: &[String],
) -> Result<&'c [String]> {
    let columns = catalog.columns(&rows.database, &rows.table).unwrap_or(&[]);
    if columns.len() != row.len() {
        return Err(PitrError::SchemaDriftDuringRollback {
            database: rows.database.clone(),
            table: rows.table.clone(),
            expected: columns.len(),
            found: row.len(),
        });
    }
    Ok(columns)
}

/// Invert one rows event, last row first
pub fn invert_rows(rows: &RowsEvent, catalog: &TableCatalog) -> Result<Vec<RollbackStatement>> {
    let mut out = Vec::with_capacity(rows.row_count());
    match rows.kind {
        DmlKind::Insert => {
            for after in rows.rows_after.iter().rev() {
                let columns = checked_columns(catalog, rows, after)?;
                out.push(RollbackStatement::Delete {
                    database: rows.database.clone(),
                    table: rows.table.clone(),
                    predicate: pair(columns, after),
                });
            }
        }
        DmlKind::Delete => {
            for before in rows.rows_before.iter().rev() {
                let columns = checked_columns(catalog, rows, before)?;
                out.push(RollbackStatement::Insert {
                    database: rows.database.clone(),
                    table: rows.table.clone(),
                    columns: columns.to_vec(),
                    values: before.clone(),
                });
            }
        }
        DmlKind::Update => {
            for (before, after) in rows.rows_before.iter().zip(&rows.rows_after).rev() {
                let columns = checked_columns(catalog, rows, before)?;
                out.push(RollbackStatement::Update {
                    database: rows.database.clone(),
                    table: rows.table.clone(),
                    assignments: pair(columns, before),
                    predicate: pair(columns, after),
                });
            }
        }
    }
    Ok(out)
}

/// Statements undoing `txn`, latest event first. QUERY and other events are skipped.
pub fn rollback_statements(
    txn: &Transaction,
    catalog: &TableCatalog,
) -> Result<Vec<RollbackStatement>> {
    let mut out = Vec::new();
    for event in txn.events.iter().rev() {
        if let Some(rows) = event.rows()? {
            out.extend(invert_rows(&rows, catalog)?);
        }
    }
    Ok(out)
}

/// Newline-joined rollback SQL for `txns`, latest transaction first
pub fn rollback_sql(txns: &[Transaction], catalog: &TableCatalog) -> Result<String> {
    let mut lines = Vec::new();
    for txn in txns.iter().rev() {
        for stmt in rollback_statements(txn, catalog)? {
            lines.push(stmt.to_string());
        }
    }
    Ok(lines.join("\n"))
}
