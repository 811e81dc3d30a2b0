//! Database execution capability
//!
//! The recovery core never links a database client library. It talks to the
//! server through [`SqlDriver`] and [`SqlConnection`], which the embedding
//! application implements on top of whatever client it already uses.
//! [`crate::testing::InMemoryServer`] is the in-process implementation used
//! by the tests.

use pitr_core::naming::quote_literal;
use pitr_core::{PitrError, Result};

/// One result row: column names with nullable text values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Option<String>)>,
}

impl Row {
    /// Empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a non-NULL column
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.columns.push((column.into(), Some(value.into())));
        self
    }

    /// Append a NULL column
    pub fn with_null(mut self, column: impl Into<String>) -> Self {
        self.columns.push((column.into(), None));
        self
    }

    /// Value of `column`, matched case-insensitively. NULL and missing are both `None`.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .and_then(|(_, value)| value.as_deref())
    }

    /// True if the row has a column called `column`
    pub fn has_column(&self, column: &str) -> bool {
        self.columns
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(column))
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the row has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// An open session on the server
pub trait SqlConnection: Send {
    /// Run a statement that returns no rows
    fn execute(&mut self, statement: &str) -> Result<()>;

    /// Run a statement and collect its rows
    fn query(&mut self, statement: &str) -> Result<Vec<Row>>;

    /// Commit the session's open transaction, if any
    fn commit(&mut self) -> Result<()>;
}

/// Opens sessions on one server
pub trait SqlDriver: Send + Sync {
    /// Open a session, optionally with `database` as the default database
    fn connect(&self, database: Option<&str>) -> Result<Box<dyn SqlConnection>>;
}

/// Values of `column` across all rows of `statement`; NULLs are skipped
pub fn query_column(
    conn: &mut dyn SqlConnection,
    statement: &str,
    column: &str,
) -> Result<Vec<String>> {
    let rows = conn.query(statement)?;
    let mut values = Vec::with_capacity(rows.len());
    for row in &rows {
        if !row.has_column(column) {
            return Err(PitrError::database(
                statement,
                format!("result has no column {}", column),
            ));
        }
        if let Some(value) = row.get(column) {
            values.push(value.to_string());
        }
    }
    Ok(values)
}

/// Value of a server variable via `SHOW VARIABLES`
pub fn server_variable(conn: &mut dyn SqlConnection, name: &str) -> Result<String> {
    let statement = format!("SHOW VARIABLES LIKE {}", quote_literal(name));
    let rows = conn.query(&statement)?;
    let row = rows
        .first()
        .ok_or_else(|| PitrError::database(&statement, "query returned no rows"))?;
    match (row.get("Variable_name"), row.get("Value")) {
        (Some(found), Some(value)) if found.eq_ignore_ascii_case(name) => Ok(value.to_string()),
        (Some(found), _) if !found.eq_ignore_ascii_case(name) => Err(PitrError::database(
            &statement,
            format!("expected variable {}, got {}", name, found),
        )),
        _ => Err(PitrError::database(&statement, "variable has no value")),
    }
}

/// True if `database` exists on the server
pub fn database_exists(conn: &mut dyn SqlConnection, database: &str) -> Result<bool> {
    let statement = format!(
        "SELECT SCHEMA_NAME FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME = {}",
        quote_literal(database)
    );
    Ok(!conn.query(&statement)?.is_empty())
}

/// A table as listed by `INFORMATION_SCHEMA.TABLES`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name
    pub name: String,
    /// `BASE TABLE`, `VIEW`, ...
    pub table_type: String,
    /// Storage engine; views have none
    pub engine: Option<String>,
}

impl TableInfo {
    /// True for views
    pub fn is_view(&self) -> bool {
        self.table_type.eq_ignore_ascii_case("VIEW")
    }
}

/// Tables and views of `database`, sorted by name
pub fn list_tables(conn: &mut dyn SqlConnection, database: &str) -> Result<Vec<TableInfo>> {
    let statement = format!(
        "SELECT TABLE_NAME, TABLE_TYPE, ENGINE FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_SCHEMA = {} ORDER BY TABLE_NAME",
        quote_literal(database)
    );
    let rows = conn.query(&statement)?;
    rows.iter()
        .map(|row| {
            let name = row
                .get("TABLE_NAME")
                .ok_or_else(|| PitrError::database(&statement, "row without TABLE_NAME"))?;
            Ok(TableInfo {
                name: name.to_string(),
                table_type: row.get("TABLE_TYPE").unwrap_or("BASE TABLE").to_string(),
                engine: row.get("ENGINE").map(str::to_string),
            })
        })
        .collect()
}

/// Column names of `database`.`table` in ordinal order
pub fn table_columns(
    conn: &mut dyn SqlConnection,
    database: &str,
    table: &str,
) -> Result<Vec<String>> {
    let statement = format!(
        "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} ORDER BY ORDINAL_POSITION",
        quote_literal(database),
        quote_literal(table)
    );
    query_column(conn, &statement, "COLUMN_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryServer;

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let row = Row::new().with("Log_name", "binlog.000001").with_null("Extra");
        assert_eq!(row.get("log_name"), Some("binlog.000001"));
        assert_eq!(row.get("Extra"), None);
        assert!(row.has_column("extra"));
        assert!(!row.has_column("missing"));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_server_variable() {
        let server = InMemoryServer::new();
        server.set_variable("binlog_format", "ROW");
        let mut conn = server.connect(None).unwrap();
        assert_eq!(server_variable(conn.as_mut(), "binlog_format").unwrap(), "ROW");
        assert!(matches!(
            server_variable(conn.as_mut(), "no_such_variable"),
            Err(PitrError::Database { .. })
        ));
    }

    #[test]
    fn test_catalog_queries() {
        let server = InMemoryServer::new();
        server.create_table("shop", "orders", &["id", "total"]);
        server.create_view("shop", "order_totals");
        let mut conn = server.connect(None).unwrap();

        assert!(database_exists(conn.as_mut(), "shop").unwrap());
        assert!(!database_exists(conn.as_mut(), "other").unwrap());

        let tables = list_tables(conn.as_mut(), "shop").unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "order_totals");
        assert!(tables[0].is_view());
        assert_eq!(tables[1].engine.as_deref(), Some("InnoDB"));

        assert_eq!(
            table_columns(conn.as_mut(), "shop", "orders").unwrap(),
            vec!["id", "total"]
        );
    }
}
