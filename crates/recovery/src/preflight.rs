//! Pre-flight checks
//!
//! Point-in-time recovery needs MySQL 8.0 or later with row-based binary
//! logging, and every table of the database on InnoDB. The checks run before
//! anything is created on the server.

use pitr_core::{PitrError, Result};
use tracing::debug;

use crate::connection::{list_tables, server_variable, SqlConnection};

/// Oldest supported server version (major, minor)
pub const MIN_SERVER_VERSION: (u64, u64) = (8, 0);

/// Value of `lower_case_table_names`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierCase {
    /// 0: stored as given, compared case-sensitively
    Sensitive,
    /// 1: stored lowercase, compared case-insensitively
    LowercaseStored,
    /// 2: stored as given, compared in lowercase
    LowercaseCompared,
}

impl IdentifierCase {
    /// Parse the variable's value
    pub fn from_variable(value: &str) -> Result<Self> {
        match value.trim() {
            "0" => Ok(IdentifierCase::Sensitive),
            "1" => Ok(IdentifierCase::LowercaseStored),
            "2" => Ok(IdentifierCase::LowercaseCompared),
            other => Err(PitrError::precondition(format!(
                "expected lower_case_table_names in [0, 1, 2], got {}",
                other
            ))),
        }
    }

    /// Database name as it appears in the binlog's row events
    pub fn binlog_name(&self, database: &str) -> String {
        match self {
            IdentifierCase::Sensitive => database.to_string(),
            IdentifierCase::LowercaseStored | IdentifierCase::LowercaseCompared => {
                database.to_lowercase()
            }
        }
    }
}

/// What the checks learned about the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// `version` as reported
    pub version: String,
    /// Identifier case handling
    pub identifier_case: IdentifierCase,
}

/// Reject versions older than [`MIN_SERVER_VERSION`].
///
/// Accepts vendor suffixes such as `8.0.30-log` or `8.0.30-0ubuntu0.22.04.1`.
pub fn check_version(version: &str) -> Result<()> {
    let mut parts = version
        .split(|c: char| !c.is_ascii_digit())
        .take(2)
        .map(str::parse::<u64>);
    let (Some(Ok(major)), Some(Ok(minor))) = (parts.next(), parts.next()) else {
        return Err(PitrError::precondition(format!(
            "cannot parse server version {:?}",
            version
        )));
    };
    if (major, minor) < MIN_SERVER_VERSION {
        return Err(PitrError::precondition(format!(
            "version {} is not supported; the minimum supported version is {}.{}",
            version, MIN_SERVER_VERSION.0, MIN_SERVER_VERSION.1
        )));
    }
    Ok(())
}

/// Binary logging must be on
pub fn check_binlog_enabled(conn: &mut dyn SqlConnection) -> Result<()> {
    let value = server_variable(conn, "log_bin")?;
    if !value.eq_ignore_ascii_case("ON") {
        return Err(PitrError::precondition("binlog is not enabled"));
    }
    Ok(())
}

/// Binary log format must be ROW
pub fn check_binlog_row_format(conn: &mut dyn SqlConnection) -> Result<()> {
    let value = server_variable(conn, "binlog_format")?;
    if !value.eq_ignore_ascii_case("ROW") {
        return Err(PitrError::precondition(format!(
            "binlog format is {} instead of ROW",
            value
        )));
    }
    Ok(())
}

/// Every base table of `database` must use InnoDB
pub fn check_engine_innodb(conn: &mut dyn SqlConnection, database: &str) -> Result<()> {
    let offending: Vec<String> = list_tables(conn, database)?
        .into_iter()
        .filter(|t| !t.is_view())
        .filter(|t| {
            !t.engine
                .as_deref()
                .map_or(false, |e| e.eq_ignore_ascii_case("InnoDB"))
        })
        .map(|t| t.name)
        .collect();
    if !offending.is_empty() {
        return Err(PitrError::precondition(format!(
            "tables {} of database {} do not use the InnoDB engine",
            offending.join(", "),
            database
        )));
    }
    Ok(())
}

/// Run every check for recovering `database`
pub fn check(conn: &mut dyn SqlConnection, database: &str) -> Result<ServerSettings> {
    let version = server_variable(conn, "version")?;
    check_version(&version)?;
    check_binlog_enabled(conn)?;
    check_binlog_row_format(conn)?;
    check_engine_innodb(conn, database)?;
    let identifier_case =
        IdentifierCase::from_variable(&server_variable(conn, "lower_case_table_names")?)?;
    debug!(%version, ?identifier_case, database = %database, "pre-flight checks passed");
    Ok(ServerSettings {
        version,
        identifier_case,
    })
}
