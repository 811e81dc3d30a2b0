//! Test doubles for the decoder capability
//!
//! - [`DumpBuilder`] renders decoded-binlog text with real header lines
//! - [`ScriptedDecoder`] serves that text per file path and applies the
//!   same start/stop filters `mysqlbinlog` would
//!
//! # Example
//!
//! ```ignore
//! let decoder = ScriptedDecoder::new();
//! decoder.add_file(dir.file_path("binlog.000001"), DumpBuilder::new(t0).insert(t1, 7, "db", "t", &[&["1"]]).build());
//! let coordinate = CoordinateResolver::new(&dir, &decoder).resolve(t1)?;
//! ```

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use pitr_binlog::{parse_position_line, EventHeader};
use pitr_core::time::format_header_datetime;
use pitr_core::{PitrError, Result};

use crate::decoder::{DecodeRequest, DecodedStream, LogDecoder, FORMAT_DESCRIPTION_POSITION};

/// Builds decoded-binlog text one event at a time
#[derive(Debug, Clone)]
pub struct DumpBuilder {
    text: String,
    next_pos: u64,
}

impl DumpBuilder {
    /// Start a file created at `created_ts`
    pub fn new(created_ts: i64) -> Self {
        let mut builder = DumpBuilder {
            text: "# The proper term is pseudo_replica_mode, but we use this compatibility alias\n\
                   /*!50530 SET @@SESSION.PSEUDO_SLAVE_MODE=1*/;\n\
                   DELIMITER /*!*/;\n"
                .to_string(),
            next_pos: FORMAT_DESCRIPTION_POSITION,
        };
        builder.push(
            created_ts,
            122,
            "Start: binlog v 4, server v 8.0.30 created",
            "BINLOG '\nu0BNYw8BAAAAegAAAH4AAAAAAAQAOC4wLjMw\n'/*!*/;\n",
        );
        builder.push(created_ts, 31, "Previous-GTIDs", "# [empty]\n");
        builder
    }

    fn push(&mut self, ts: i64, len: u64, event: &str, body: &str) {
        let pos = self.next_pos;
        let datetime = format_header_datetime(ts).unwrap_or_default();
        self.text.push_str(&format!(
            "# at {}\n#{} server id 1  end_log_pos {} CRC32 0x00000000 \t{}\n{}",
            pos,
            datetime,
            pos + len,
            event,
            body
        ));
        self.next_pos = pos + len;
    }

    /// Append an arbitrary event
    pub fn event(mut self, ts: i64, event: &str, body: &str) -> Self {
        self.push(ts, 64, event, body);
        self
    }

    /// Append a synthetic (`end_log_pos 0`) rotate event
    pub fn rotate(mut self, ts: i64, next_file: &str) -> Self {
        let pos = self.next_pos;
        let datetime = format_header_datetime(ts).unwrap_or_default();
        self.text.push_str(&format!(
            "# at {}\n#{} server id 1  end_log_pos 0 CRC32 0x00000000 \tRotate to {}  pos: 4\n",
            pos, datetime, next_file
        ));
        self
    }

    /// Append `BEGIN`, one rows event inserting `rows` and a commit
    pub fn insert(self, ts: i64, thread_id: u64, database: &str, table: &str, rows: &[&[&str]]) -> Self {
        let mut body = String::new();
        for row in rows {
            body.push_str(&format!("### INSERT INTO `{}`.`{}`\n### SET\n", database, table));
            for (i, value) in row.iter().enumerate() {
                body.push_str(&format!("###   @{}={}\n", i + 1, value));
            }
        }
        self.begin(ts, thread_id)
            .event(
                ts,
                &format!("Table_map: `{}`.`{}` mapped to number 91", database, table),
                "",
            )
            .event(ts, "Write_rows: table id 91 flags: STMT_END_F", &body)
            .event(ts, "Xid = 1", "COMMIT/*!*/;\n")
    }

    /// Append a `BEGIN` query event for `thread_id`
    pub fn begin(self, ts: i64, thread_id: u64) -> Self {
        self.event(
            ts,
            &format!("Query\tthread_id={}\texec_time=0\terror_code=0", thread_id),
            &format!("SET TIMESTAMP={}/*!*/;\nBEGIN\n/*!*/;\n", ts),
        )
    }

    /// Offset the next event will get
    pub fn next_position(&self) -> u64 {
        self.next_pos
    }

    /// Finish the text
    pub fn build(mut self) -> String {
        self.text.push_str("DELIMITER ;\n# End of log file\n");
        self.text
    }
}

/// A [`LogDecoder`] that serves canned text
#[derive(Debug, Default)]
pub struct ScriptedDecoder {
    files: Mutex<HashMap<PathBuf, String>>,
    failing: Mutex<HashSet<PathBuf>>,
    requests: Mutex<Vec<DecodeRequest>>,
}

impl ScriptedDecoder {
    /// Decoder with no files
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `text` for `path`
    pub fn add_file(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files.lock().insert(path.into(), text.into());
    }

    /// Make decoding `path` fail like a crashed tool
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.failing.lock().insert(path.into());
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<DecodeRequest> {
        self.requests.lock().clone()
    }

    fn render(&self, path: &Path, request: &DecodeRequest, first: bool, last: bool, stopped: &mut bool) -> Result<String> {
        if self.failing.lock().contains(path) {
            return Err(PitrError::tool(
                "mysqlbinlog",
                format!("exit status: 1: could not read {}", path.display()),
            ));
        }
        let files = self.files.lock();
        let text = files.get(path).ok_or_else(|| {
            PitrError::tool(
                "mysqlbinlog",
                format!("exit status: 1: File '{}' not found", path.display()),
            )
        })?;

        let mut out = String::new();
        let mut keep = true;
        let mut lines = text.lines().peekable();
        while let Some(line) = lines.next() {
            if let Some(position) = parse_position_line(line) {
                let header = lines
                    .peek()
                    .and_then(|h| EventHeader::parse(h, position).ok().flatten());
                keep = !*stopped;
                if position != FORMAT_DESCRIPTION_POSITION {
                    if first && request.start_position.map_or(false, |p| position < p) {
                        keep = false;
                    }
                    if last && request.stop_position.map_or(false, |p| position >= p) {
                        *stopped = true;
                        keep = false;
                    }
                    if let Some(header) = &header {
                        if request.start_ts.map_or(false, |ts| header.timestamp < ts) {
                            keep = false;
                        }
                        if request.stop_ts.map_or(false, |ts| header.timestamp >= ts) {
                            *stopped = true;
                            keep = false;
                        }
                    }
                }
            }
            if keep {
                let line = match &request.rewrite_db {
                    Some((from, to)) => line.replace(&format!("`{}`", from), &format!("`{}`", to)),
                    None => line.to_string(),
                };
                out.push_str(&line);
                out.push('\n');
            }
        }
        Ok(out)
    }
}

impl LogDecoder for ScriptedDecoder {
    fn decode(&self, request: &DecodeRequest) -> Result<DecodedStream> {
        self.requests.lock().push(request.clone());
        let mut out = String::new();
        let mut stopped = false;
        let count = request.files.len();
        for (i, path) in request.files.iter().enumerate() {
            out.push_str(&self.render(path, request, i == 0, i + 1 == count, &mut stopped)?);
        }
        Ok(DecodedStream::from_reader(Cursor::new(out.into_bytes())))
    }
}
