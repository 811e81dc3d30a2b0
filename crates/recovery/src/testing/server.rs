//! In-memory stand-in for a MySQL server

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use pitr_core::{PitrError, Result};

use crate::connection::{Row, SqlConnection, SqlDriver};

/// A statement executed against an [`InMemoryServer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedStatement {
    /// Session index, in connect order
    pub session: usize,
    /// Statement text
    pub sql: String,
    /// Whether `sql_log_bin` was on for the session
    pub binlog: bool,
    /// Rejected by an injected failure
    pub failed: bool,
}

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<String>,
    engine: Option<String>,
    view: bool,
    rows: Vec<String>,
}

#[derive(Debug, Default)]
struct Session {
    database: Option<String>,
    binlog: bool,
}

#[derive(Debug, Default)]
struct ServerState {
    databases: BTreeMap<String, BTreeMap<String, Table>>,
    variables: HashMap<String, String>,
    binary_logs: Vec<(String, u64)>,
    master_status: Option<(String, u64)>,
    failures: Vec<String>,
    sessions: Vec<Session>,
    statements: Vec<ExecutedStatement>,
    commits: usize,
}

/// A [`SqlDriver`] that keeps databases, tables and rows in memory.
///
/// It understands the statements the recovery core issues plus the common
/// shapes of a `mysqldump` file. Anything else is recorded and accepted.
/// Rows are kept as the raw text of their `VALUES` tuple.
#[derive(Debug, Clone, Default)]
pub struct InMemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl InMemoryServer {
    /// Server with MySQL 8.0 defaults: binlog on, ROW format, case-sensitive names
    pub fn new() -> Self {
        let server = Self::default();
        for (name, value) in [
            ("version", "8.0.30"),
            ("log_bin", "ON"),
            ("binlog_format", "ROW"),
            ("lower_case_table_names", "0"),
        ] {
            server.set_variable(name, value);
        }
        server
    }

    /// Set a server variable
    pub fn set_variable(&self, name: &str, value: &str) {
        self.state
            .lock()
            .variables
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    /// Set what `SHOW BINARY LOGS` returns
    pub fn set_binary_logs(&self, logs: &[(&str, u64)]) {
        self.state.lock().binary_logs = logs.iter().map(|(n, s)| (n.to_string(), *s)).collect();
    }

    /// Set what `SHOW MASTER STATUS` returns
    pub fn set_master_status(&self, file: &str, position: u64) {
        self.state.lock().master_status = Some((file.to_string(), position));
    }

    /// Fail every statement containing `pattern`
    pub fn fail_on(&self, pattern: &str) {
        self.state.lock().failures.push(pattern.to_string());
    }

    /// Create an empty database
    pub fn create_database(&self, database: &str) {
        self.state
            .lock()
            .databases
            .entry(database.to_string())
            .or_default();
    }

    /// Create an InnoDB table, creating the database if needed
    pub fn create_table(&self, database: &str, table: &str, columns: &[&str]) {
        self.create_table_with_engine(database, table, columns, "InnoDB");
    }

    /// Create a table with a specific storage engine
    pub fn create_table_with_engine(&self, database: &str, table: &str, columns: &[&str], engine: &str) {
        self.state
            .lock()
            .databases
            .entry(database.to_string())
            .or_default()
            .insert(
                table.to_string(),
                Table {
                    columns: columns.iter().map(|c| c.to_string()).collect(),
                    engine: Some(engine.to_string()),
                    ..Table::default()
                },
            );
    }

    /// Create a view
    pub fn create_view(&self, database: &str, view: &str) {
        self.state
            .lock()
            .databases
            .entry(database.to_string())
            .or_default()
            .insert(
                view.to_string(),
                Table {
                    view: true,
                    ..Table::default()
                },
            );
    }

    /// Append a row given as its tuple text, e.g. `(1,'a')`
    pub fn insert_row(&self, database: &str, table: &str, tuple: &str) {
        if let Some(t) = self
            .state
            .lock()
            .databases
            .get_mut(database)
            .and_then(|tables| tables.get_mut(table))
        {
            t.rows.push(tuple.to_string());
        }
    }

    /// True if `database` exists
    pub fn database_exists(&self, database: &str) -> bool {
        self.state.lock().databases.contains_key(database)
    }

    /// Databases, sorted
    pub fn databases(&self) -> Vec<String> {
        self.state.lock().databases.keys().cloned().collect()
    }

    /// Table names of `database`, sorted; empty if it does not exist
    pub fn tables(&self, database: &str) -> Vec<String> {
        self.state
            .lock()
            .databases
            .get(database)
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Rows of `database`.`table` as tuple text
    pub fn rows(&self, database: &str, table: &str) -> Vec<String> {
        self.state
            .lock()
            .databases
            .get(database)
            .and_then(|tables| tables.get(table))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Every statement attempted so far, queries excluded
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.state.lock().statements.clone()
    }

    /// Whether `sql_log_bin` is currently on for `session`
    pub fn session_binlog(&self, session: usize) -> Option<bool> {
        self.state.lock().sessions.get(session).map(|s| s.binlog)
    }

    /// Default database of every session opened so far
    pub fn sessions(&self) -> Vec<Option<String>> {
        self.state
            .lock()
            .sessions
            .iter()
            .map(|s| s.database.clone())
            .collect()
    }

    /// Number of commits
    pub fn commits(&self) -> usize {
        self.state.lock().commits
    }
}

impl SqlDriver for InMemoryServer {
    fn connect(&self, database: Option<&str>) -> Result<Box<dyn SqlConnection>> {
        let mut state = self.state.lock();
        if let Some(db) = database {
            if !state.databases.contains_key(db) {
                return Err(PitrError::database(
                    format!("USE `{}`", db),
                    format!("Unknown database '{}'", db),
                ));
            }
        }
        state.sessions.push(Session {
            database: database.map(str::to_string),
            binlog: true,
        });
        Ok(Box::new(InMemoryConnection {
            state: Arc::clone(&self.state),
            session: state.sessions.len() - 1,
        }))
    }
}

struct InMemoryConnection {
    state: Arc<Mutex<ServerState>>,
    session: usize,
}

impl SqlConnection for InMemoryConnection {
    fn execute(&mut self, statement: &str) -> Result<()> {
        let mut state = self.state.lock();
        let injected = state.check_failure(statement);
        let binlog = state.sessions[self.session].binlog;
        state.statements.push(ExecutedStatement {
            session: self.session,
            sql: statement.to_string(),
            binlog,
            failed: injected.is_err(),
        });
        injected?;
        state
            .apply(self.session, statement)
            .map_err(|message| PitrError::database(statement, message))
    }

    fn query(&mut self, statement: &str) -> Result<Vec<Row>> {
        let mut state = self.state.lock();
        state.check_failure(statement)?;
        state
            .select(statement)
            .map_err(|message| PitrError::database(statement, message))
    }

    fn commit(&mut self) -> Result<()> {
        self.state.lock().commits += 1;
        Ok(())
    }
}

fn starts_with_ci(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
}

/// Backtick-quoted identifiers of `s`, in order
fn identifiers(s: &str) -> Vec<String> {
    quoted(s, '`')
}

/// Single-quoted literals of `s`, in order
fn literals(s: &str) -> Vec<String> {
    quoted(s, '\'')
}

fn quoted(s: &str, quote: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != quote {
            continue;
        }
        let mut value = String::new();
        while let Some(c) = chars.next() {
            if c == '\\' && quote == '\'' {
                if let Some(escaped) = chars.next() {
                    value.push(escaped);
                }
            } else if c == quote {
                if chars.peek() == Some(&quote) {
                    chars.next();
                    value.push(quote);
                } else {
                    break;
                }
            } else {
                value.push(c);
            }
        }
        out.push(value);
    }
    out
}

/// Top-level `( ... )` groups after `VALUES`
fn tuples(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' if depth > 0 => {
                quote = Some(c);
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' if depth > 0 => {
                depth -= 1;
                current.push(c);
                if depth == 0 {
                    out.push(std::mem::take(&mut current));
                }
            }
            _ if depth > 0 => current.push(c),
            _ => {}
        }
    }
    out
}

/// Column names of a `CREATE TABLE` body: lines inside the parentheses that
/// start with a quoted identifier
fn create_table_columns(statement: &str) -> Vec<String> {
    let Some(open) = statement.find('(') else {
        return Vec::new();
    };
    statement[open + 1..]
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('`'))
        .filter_map(|line| identifiers(line).into_iter().next())
        .collect()
}

impl ServerState {
    fn check_failure(&self, statement: &str) -> Result<()> {
        match self.failures.iter().find(|p| statement.contains(p.as_str())) {
            Some(pattern) => Err(PitrError::database(
                statement,
                format!("injected failure on {:?}", pattern),
            )),
            None => Ok(()),
        }
    }

    fn current_database(&self, session: usize) -> std::result::Result<String, String> {
        self.sessions[session]
            .database
            .clone()
            .ok_or_else(|| "No database selected".to_string())
    }

    /// Resolve `name` or `db`.`name` against the session
    fn qualify(&self, session: usize, ids: &[String]) -> std::result::Result<(String, String), String> {
        match ids {
            [table] => Ok((self.current_database(session)?, table.clone())),
            [database, table, ..] => Ok((database.clone(), table.clone())),
            [] => Err("missing table name".to_string()),
        }
    }

    fn apply(&mut self, session: usize, sql: &str) -> std::result::Result<(), String> {
        let upper = sql.to_ascii_uppercase();
        if starts_with_ci(sql, "SET ") {
            if upper.replace(' ', "").starts_with("SETSQL_LOG_BIN=") {
                self.sessions[session].binlog = upper.ends_with("ON") || upper.ends_with('1');
            }
            return Ok(());
        }
        if starts_with_ci(sql, "CREATE DATABASE") {
            let name = identifiers(sql).pop().ok_or("missing database name")?;
            if self.databases.contains_key(&name) {
                if upper.contains("IF NOT EXISTS") {
                    return Ok(());
                }
                return Err(format!("Can't create database '{}'; database exists", name));
            }
            self.databases.insert(name, BTreeMap::new());
            return Ok(());
        }
        if starts_with_ci(sql, "DROP DATABASE") {
            let name = identifiers(sql).pop().ok_or("missing database name")?;
            if self.databases.remove(&name).is_none() && !upper.contains("IF EXISTS") {
                return Err(format!("Can't drop database '{}'; database doesn't exist", name));
            }
            return Ok(());
        }
        if starts_with_ci(sql, "CREATE TABLE") {
            let head = sql.split('(').next().unwrap_or(sql);
            let (database, table) = self.qualify(session, &identifiers(head))?;
            let tables = self
                .databases
                .get_mut(&database)
                .ok_or_else(|| format!("Unknown database '{}'", database))?;
            if tables.contains_key(&table) {
                return Err(format!("Table '{}' already exists", table));
            }
            let engine = upper
                .split("ENGINE=")
                .nth(1)
                .and_then(|rest| rest.split(|c: char| !c.is_ascii_alphanumeric()).next())
                .map(|e| if e == "INNODB" { "InnoDB".to_string() } else { e.to_string() })
                .unwrap_or_else(|| "InnoDB".to_string());
            tables.insert(
                table,
                Table {
                    columns: create_table_columns(sql),
                    engine: Some(engine),
                    ..Table::default()
                },
            );
            return Ok(());
        }
        if starts_with_ci(sql, "DROP TABLE") {
            let (database, table) = self.qualify(session, &identifiers(sql))?;
            let removed = self
                .databases
                .get_mut(&database)
                .and_then(|tables| tables.remove(&table));
            if removed.is_none() && !upper.contains("IF EXISTS") {
                return Err(format!("Unknown table '{}.{}'", database, table));
            }
            return Ok(());
        }
        if starts_with_ci(sql, "INSERT INTO") {
            let values_at = upper.find("VALUES").ok_or("INSERT without VALUES")?;
            let (database, table) = self.qualify(session, &identifiers(&sql[..values_at]))?;
            let target = self
                .databases
                .get_mut(&database)
                .and_then(|tables| tables.get_mut(&table))
                .ok_or_else(|| format!("Table '{}.{}' doesn't exist", database, table))?;
            target.rows.extend(tuples(&sql[values_at..]));
            return Ok(());
        }
        if starts_with_ci(sql, "RENAME TABLE") {
            return self.rename(session, &sql["RENAME TABLE".len()..]);
        }
        Ok(())
    }

    /// `a TO b, c TO d`; applied left to right, all or nothing
    fn rename(&mut self, session: usize, spec: &str) -> std::result::Result<(), String> {
        let mut staged = self.databases.clone();
        for pair in spec.split(',') {
            let mut sides = pair.splitn(2, " TO ");
            let from = identifiers(sides.next().unwrap_or_default());
            let to = identifiers(sides.next().ok_or("RENAME without TO")?);
            let (from_db, from_table) = self.qualify(session, &from)?;
            let (to_db, to_table) = self.qualify(session, &to)?;
            let table = staged
                .get_mut(&from_db)
                .and_then(|tables| tables.remove(&from_table))
                .ok_or_else(|| format!("Table '{}.{}' doesn't exist", from_db, from_table))?;
            if table.view && from_db != to_db {
                return Err(format!("Can't move view '{}' to another database", from_table));
            }
            let target = staged
                .get_mut(&to_db)
                .ok_or_else(|| format!("Unknown database '{}'", to_db))?;
            if target.contains_key(&to_table) {
                return Err(format!("Table '{}' already exists", to_table));
            }
            target.insert(to_table, table);
        }
        self.databases = staged;
        Ok(())
    }

    fn select(&self, sql: &str) -> std::result::Result<Vec<Row>, String> {
        let upper = sql.to_ascii_uppercase();
        let args = literals(sql);

        if upper.starts_with("SHOW VARIABLES LIKE") {
            let name = args.first().ok_or("missing variable name")?;
            return Ok(self
                .variables
                .get(&name.to_ascii_lowercase())
                .map(|value| {
                    vec![Row::new()
                        .with("Variable_name", name.clone())
                        .with("Value", value.clone())]
                })
                .unwrap_or_default());
        }
        if upper.starts_with("SHOW BINARY LOGS") {
            if self.variables.get("log_bin").map(String::as_str) != Some("ON") {
                return Err("You are not using binary logging".to_string());
            }
            return Ok(self
                .binary_logs
                .iter()
                .map(|(name, size)| {
                    Row::new()
                        .with("Log_name", name.clone())
                        .with("File_size", size.to_string())
                        .with("Encrypted", "No")
                })
                .collect());
        }
        if upper.starts_with("SHOW MASTER STATUS") {
            return Ok(self
                .master_status
                .iter()
                .map(|(file, position)| {
                    Row::new()
                        .with("File", file.clone())
                        .with("Position", position.to_string())
                        .with("Binlog_Do_DB", "")
                })
                .collect());
        }
        if upper.contains("FROM INFORMATION_SCHEMA.SCHEMATA") {
            let name = args.first().ok_or("missing schema name")?;
            return Ok(self
                .databases
                .keys()
                .filter(|db| *db == name)
                .map(|db| Row::new().with("SCHEMA_NAME", db.clone()))
                .collect());
        }
        if upper.contains("FROM INFORMATION_SCHEMA.TABLES") {
            let database = args.first().ok_or("missing schema name")?;
            return Ok(self
                .databases
                .get(database)
                .map(|tables| {
                    tables
                        .iter()
                        .map(|(name, table)| {
                            let row = Row::new().with("TABLE_NAME", name.clone()).with(
                                "TABLE_TYPE",
                                if table.view { "VIEW" } else { "BASE TABLE" },
                            );
                            match &table.engine {
                                Some(engine) => row.with("ENGINE", engine.clone()),
                                None => row.with_null("ENGINE"),
                            }
                        })
                        .collect()
                })
                .unwrap_or_default());
        }
        if upper.contains("FROM INFORMATION_SCHEMA.COLUMNS") {
            let (database, table) = match args.as_slice() {
                [database, table, ..] => (database, table),
                _ => return Err("missing schema or table name".to_string()),
            };
            return Ok(self
                .databases
                .get(database)
                .and_then(|tables| tables.get(table))
                .map(|t| {
                    t.columns
                        .iter()
                        .map(|c| Row::new().with("COLUMN_NAME", c.clone()))
                        .collect()
                })
                .unwrap_or_default());
        }
        Err(format!("unsupported query: {}", sql))
    }
}
