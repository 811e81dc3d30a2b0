//! Restoring a logical backup into a database
//!
//! The backup payload is `mysqldump` output: SQL statements terminated by
//! `;`, `--` comment lines, `/*!NNNNN ... */` conditional comments and
//! occasional `DELIMITER` blocks around routine and trigger bodies.
//! [`DumpStatements`] splits it into statements without loading the whole
//! dump.
//!
//! Statements that would leave the target database (`USE`, `CREATE DATABASE`)
//! are skipped so a dump taken with `--databases` still lands in the side
//! database.

use std::collections::VecDeque;
use std::io::{self, BufRead};

use pitr_core::Result;
use tracing::{debug, info};

use crate::connection::SqlConnection;

/// Iterator over the statements of a SQL dump
pub struct DumpStatements<R> {
    reader: R,
    delimiter: String,
    /// Text of the statement being read
    statement: String,
    /// Statements completed by the last line, in order
    ready: VecDeque<String>,
    quote: Option<char>,
    in_block_comment: bool,
    finished: bool,
}

impl<R: BufRead> DumpStatements<R> {
    /// Split `reader`
    pub fn new(reader: R) -> Self {
        DumpStatements {
            reader,
            delimiter: ";".to_string(),
            statement: String::new(),
            ready: VecDeque::new(),
            quote: None,
            in_block_comment: false,
            finished: false,
        }
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    fn between_statements(&self) -> bool {
        self.quote.is_none() && !self.in_block_comment && self.statement.trim().is_empty()
    }

    fn next_statement(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(statement) = self.ready.pop_front() {
                return Ok(Some(statement));
            }
            let Some(line) = self.read_line()? else {
                if self.quote.is_some() {
                    return Err(invalid_data("dump ends inside a quoted string"));
                }
                if self.in_block_comment {
                    return Err(invalid_data("dump ends inside a comment"));
                }
                let rest = self.statement.trim().to_string();
                self.statement.clear();
                return Ok((!rest.is_empty()).then_some(rest));
            };

            if self.between_statements() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed == "--" || trimmed.starts_with("-- ") {
                    continue;
                }
                if let Some(delimiter) = strip_keyword(trimmed, "DELIMITER") {
                    self.delimiter = delimiter.trim().to_string();
                    continue;
                }
            }
            self.scan_line(&line);
        }
    }

    /// Append `line` to the current statement, completing a statement at every
    /// delimiter found outside quotes and comments
    fn scan_line(&mut self, line: &str) {
        let chars: Vec<char> = line.chars().collect();
        let delimiter: Vec<char> = self.delimiter.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            if self.in_block_comment {
                self.statement.push(c);
                if c == '*' && next == Some('/') {
                    self.statement.push('/');
                    self.in_block_comment = false;
                    i += 1;
                }
            } else if let Some(q) = self.quote {
                self.statement.push(c);
                if c == '\\' && q != '`' {
                    if let Some(escaped) = next {
                        self.statement.push(escaped);
                        i += 1;
                    }
                } else if c == q {
                    if next == Some(q) {
                        self.statement.push(q);
                        i += 1;
                    } else {
                        self.quote = None;
                    }
                }
            } else if !delimiter.is_empty() && chars[i..].starts_with(&delimiter) {
                let body = self.statement.trim();
                if !body.is_empty() {
                    self.ready.push_back(body.to_string());
                }
                self.statement.clear();
                i += delimiter.len();
                continue;
            } else {
                match c {
                    '\'' | '"' | '`' => self.quote = Some(c),
                    '/' if next == Some('*') => {
                        self.statement.push_str("/*");
                        self.in_block_comment = true;
                        i += 2;
                        continue;
                    }
                    // `-- ` and `#` start a comment that runs to the end of the line
                    '-' if next == Some('-')
                        && chars.get(i + 2).map_or(true, |n| n.is_whitespace()) =>
                    {
                        break
                    }
                    '#' => break,
                    _ => {}
                }
                self.statement.push(c);
            }
            i += 1;
        }
        self.statement.push('\n');
    }
}

fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

impl<R: BufRead> Iterator for DumpStatements<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_statement() {
            Ok(Some(statement)) => Some(Ok(statement)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e.into()))
            }
        }
    }
}

/// Case-insensitive `KEYWORD rest` match; returns `rest`
fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let head = line.get(..keyword.len())?;
    let rest = &line[keyword.len()..];
    (head.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace)).then_some(rest)
}

fn leaves_database(statement: &str) -> bool {
    strip_keyword(statement, "USE").is_some()
        || strip_keyword(statement, "CREATE")
            .map(str::trim_start)
            .and_then(|rest| strip_keyword(rest, "DATABASE").or_else(|| strip_keyword(rest, "SCHEMA")))
            .is_some()
}

/// Counts from one restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    /// Statements executed
    pub executed: u64,
    /// Statements skipped because they would leave the target database
    pub skipped: u64,
}

/// Execute the dump in `reader` on `conn`, whose default database is the target.
///
/// Foreign key checks are off while the statements run, since a dump does
/// not order tables by their dependencies.
pub fn restore_backup<R: BufRead>(conn: &mut dyn SqlConnection, reader: R) -> Result<RestoreStats> {
    let mut stats = RestoreStats::default();
    conn.execute("SET FOREIGN_KEY_CHECKS=0")?;
    for statement in DumpStatements::new(reader) {
        let statement = statement?;
        if leaves_database(&statement) {
            debug!(statement = %statement, "skipping statement that leaves the target database");
            stats.skipped += 1;
            continue;
        }
        conn.execute(&statement)?;
        stats.executed += 1;
    }
    conn.execute("SET FOREIGN_KEY_CHECKS=1")?;
    conn.commit()?;
    info!(executed = stats.executed, skipped = stats.skipped, "restored backup");
    Ok(stats)
}
