//! Side and retired database names
//!
//! Names are `<original>_<suffix>`. When that exceeds the engine's identifier
//! limit the tail of `<original>` is cut; the suffix always survives intact
//! because it is what keeps concurrent recovery attempts apart.

use crate::error::{PitrError, Result};

/// Build `<base>_<suffix>`, truncating `base` to fit `max_len` characters.
///
/// At least one character of `base` must survive; otherwise the name would
/// no longer say which database it belongs to and is rejected.
pub fn safe_name(base: &str, suffix: &str, max_len: usize) -> Result<String> {
    let base_len = base.chars().count();
    let total = base_len + 1 + suffix.chars().count();
    if total <= max_len {
        return Ok(format!("{}_{}", base, suffix));
    }
    let keep = base_len.saturating_sub(total - max_len);
    if keep == 0 {
        return Err(PitrError::Config(format!(
            "suffix {:?} leaves no room for database {:?} within {} characters",
            suffix, base, max_len
        )));
    }
    let truncated: String = base.chars().take(keep).collect();
    Ok(format!("{}_{}", truncated, suffix))
}

/// Suffix of the side database for a recovery attempt
pub fn pitr_suffix(suffix_ts: i64) -> String {
    format!("pitr_{}", suffix_ts)
}

/// Name of the side database that receives the recovered data
pub fn pitr_database_name(database: &str, suffix_ts: i64, max_len: usize) -> Result<String> {
    safe_name(database, &pitr_suffix(suffix_ts), max_len)
}

/// Name of the database that keeps the pre-recovery tables after the swap
pub fn retired_database_name(database: &str, suffix_ts: i64, max_len: usize) -> Result<String> {
    safe_name(database, &format!("{}_old", pitr_suffix(suffix_ts)), max_len)
}

/// Quote an identifier with backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal with single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}
