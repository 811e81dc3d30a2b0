//! Row image decoder for `-v` pseudo-SQL bodies
//!
//! Rows events rendered with `--base64-output=DECODE-ROWS -v` carry one
//! block per affected row:
//!
//! ```text
//! ### UPDATE `shop`.`orders`
//! ### WHERE
//! ###   @1=7
//! ###   @2='pending'
//! ### SET
//! ###   @1=7
//! ###   @2='paid'
//! ```
//!
//! Decoding is strict: every data line must be `@<i>=` with `i` counting up
//! from 1 without gaps, and truncated blocks are rejected.

use pitr_core::{PitrError, Result};

/// Which DML statement a rows event records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmlKind {
    /// `Write_rows`
    Insert,
    /// `Update_rows`
    Update,
    /// `Delete_rows`
    Delete,
}

impl DmlKind {
    fn marker(&self) -> &'static str {
        match self {
            DmlKind::Insert => "INSERT INTO ",
            DmlKind::Update => "UPDATE ",
            DmlKind::Delete => "DELETE FROM ",
        }
    }

    fn min_block_len(&self) -> usize {
        match self {
            DmlKind::Insert | DmlKind::Delete => 3,
            DmlKind::Update => 5,
        }
    }
}

/// Decoded row images of one rows event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowsEvent {
    /// Statement kind
    pub kind: DmlKind,
    /// Database of the affected table
    pub database: String,
    /// Affected table
    pub table: String,
    /// `WHERE` images, one per row (DELETE and UPDATE)
    pub rows_before: Vec<Vec<String>>,
    /// `SET` images, one per row (INSERT and UPDATE)
    pub rows_after: Vec<Vec<String>>,
}

impl RowsEvent {
    /// Number of affected rows
    pub fn row_count(&self) -> usize {
        match self.kind {
            DmlKind::Delete => self.rows_before.len(),
            DmlKind::Insert | DmlKind::Update => self.rows_after.len(),
        }
    }
}

/// Decode the body of a rows event at `position`
pub fn decode_rows(kind: DmlKind, body: &str, position: u64) -> Result<RowsEvent> {
    let lines: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("###"))
        .map(str::trim)
        .collect();

    let mut decoder = RowsDecoder {
        kind,
        lines: &lines,
        at: 0,
        position,
    };
    decoder.decode()
}

struct RowsDecoder<'a> {
    kind: DmlKind,
    lines: &'a [&'a str],
    at: usize,
    position: u64,
}

impl<'a> RowsDecoder<'a> {
    fn error(&self, reason: impl Into<String>) -> PitrError {
        PitrError::malformed(self.position, reason)
    }

    fn decode(&mut self) -> Result<RowsEvent> {
        if self.lines.is_empty() {
            return Err(self.error("rows event has no row images"));
        }

        let mut table: Option<(String, String)> = None;
        let mut rows_before = Vec::new();
        let mut rows_after = Vec::new();

        while self.at < self.lines.len() {
            if self.lines.len() - self.at < self.kind.min_block_len() {
                return Err(self.error(format!(
                    "truncated {:?} block: {} lines left",
                    self.kind,
                    self.lines.len() - self.at
                )));
            }

            let name = self.block_marker()?;
            match &table {
                None => table = Some(name),
                Some(current) if *current != name => {
                    return Err(self.error(format!(
                        "rows event mixes tables `{}`.`{}` and `{}`.`{}`",
                        current.0, current.1, name.0, name.1
                    )));
                }
                Some(_) => {}
            }

            match self.kind {
                DmlKind::Insert => {
                    self.section_keyword("SET")?;
                    rows_after.push(self.values()?);
                }
                DmlKind::Delete => {
                    self.section_keyword("WHERE")?;
                    rows_before.push(self.values()?);
                }
                DmlKind::Update => {
                    self.section_keyword("WHERE")?;
                    let before = self.values()?;
                    self.section_keyword("SET")?;
                    let after = self.values()?;
                    if before.len() != after.len() {
                        return Err(self.error(format!(
                            "UPDATE row has {} WHERE values but {} SET values",
                            before.len(),
                            after.len()
                        )));
                    }
                    rows_before.push(before);
                    rows_after.push(after);
                }
            }
        }

        let (database, table) = table.ok_or_else(|| self.error("rows event has no row images"))?;
        Ok(RowsEvent {
            kind: self.kind,
            database,
            table,
            rows_before,
            rows_after,
        })
    }

    fn block_marker(&mut self) -> Result<(String, String)> {
        let line = self.lines[self.at];
        let name = line
            .strip_prefix(self.kind.marker())
            .ok_or_else(|| {
                self.error(format!(
                    "expected {:?} block marker, found {:?}",
                    self.kind.marker().trim_end(),
                    line
                ))
            })?;
        let qualified = parse_qualified_name(name)
            .ok_or_else(|| self.error(format!("invalid table name {:?}", name)))?;
        self.at += 1;
        Ok(qualified)
    }

    fn section_keyword(&mut self, keyword: &str) -> Result<()> {
        match self.lines.get(self.at) {
            Some(line) if *line == keyword => {
                self.at += 1;
                Ok(())
            }
            Some(line) => Err(self.error(format!("expected {}, found {:?}", keyword, line))),
            None => Err(self.error(format!("expected {}, found end of event", keyword))),
        }
    }

    /// Read `@1=..`, `@2=..`, ... until a line that does not start with `@`
    fn values(&mut self) -> Result<Vec<String>> {
        let mut values = Vec::new();
        while let Some(line) = self.lines.get(self.at) {
            if !line.starts_with('@') {
                break;
            }
            let expected = format!("@{}=", values.len() + 1);
            let value = line.strip_prefix(expected.as_str()).ok_or_else(|| {
                self.error(format!("expected {}, found {:?}", expected, line))
            })?;
            values.push(strip_type_comment(value).to_string());
            self.at += 1;
        }
        if values.is_empty() {
            return Err(self.error("row image has no values"));
        }
        Ok(values)
    }
}

/// Split `` `db`.`table` `` into its parts
fn parse_qualified_name(name: &str) -> Option<(String, String)> {
    let inner = name.trim().strip_prefix('`')?.strip_suffix('`')?;
    let (database, table) = inner.split_once("`.`")?;
    if database.is_empty() || table.is_empty() {
        return None;
    }
    Some((database.replace("``", "`"), table.replace("``", "`")))
}

/// Drop the `/* INT meta=0 nullable=1 is_null=0 */` annotation printed by `-vv`
fn strip_type_comment(value: &str) -> &str {
    match value.rfind(" /* ") {
        Some(idx) if value.ends_with("*/") => value[..idx].trim_end(),
        _ => value,
    }
}
