//! Decoder capability
//!
//! Binlog files are binary; an external decoder renders them as the textual
//! dump format parsed by `pitr-binlog`. The [`LogDecoder`] trait is the seam
//! between the recovery core and that tool. [`crate::MysqlBinlog`] is the
//! production implementation; tests substitute canned text.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;

use pitr_binlog::{parse_position_line, EventHeader};
use pitr_core::Result;

use crate::process::ToolProcess;

/// Offset of the format description event every decoded file starts with
pub const FORMAT_DESCRIPTION_POSITION: u64 = 4;

/// What to decode and how
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeRequest {
    /// Files to decode, in order
    pub files: Vec<PathBuf>,
    /// Skip events before this offset of the first file
    pub start_position: Option<u64>,
    /// Stop at this offset of the last file
    pub stop_position: Option<u64>,
    /// Skip events earlier than this time (unix seconds)
    pub start_ts: Option<i64>,
    /// Stop at the first event at or after this time (unix seconds)
    pub stop_ts: Option<i64>,
    /// Rewrite references to the first database name into the second
    pub rewrite_db: Option<(String, String)>,
    /// Only emit events for this database
    pub database: Option<String>,
    /// Print row images as `###` pseudo-SQL instead of base64
    pub row_images: bool,
    /// Output is meant to be executed: verify checksums, do not re-log
    pub replay: bool,
}

impl DecodeRequest {
    /// Decode `files` with no filters
    pub fn for_files(files: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        DecodeRequest {
            files: files.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Skip events earlier than `ts`
    pub fn start_at_time(mut self, ts: i64) -> Self {
        self.start_ts = Some(ts);
        self
    }

    /// Stop before the first event at or after `ts`
    pub fn stop_before_time(mut self, ts: i64) -> Self {
        self.stop_ts = Some(ts);
        self
    }

    /// Start at `offset` in the first file
    pub fn start_at_position(mut self, offset: u64) -> Self {
        self.start_position = Some(offset);
        self
    }

    /// Stop at `offset` in the last file
    pub fn stop_at_position(mut self, offset: u64) -> Self {
        self.stop_position = Some(offset);
        self
    }

    /// Rewrite `from` to `to` and restrict output to `to`
    pub fn rewrite_database(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let to = to.into();
        self.rewrite_db = Some((from.into(), to.clone()));
        self.database = Some(to);
        self
    }

    /// Restrict output to `database`
    pub fn only_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Render row images as pseudo-SQL
    pub fn with_row_images(mut self) -> Self {
        self.row_images = true;
        self
    }

    /// Produce executable output
    pub fn for_replay(mut self) -> Self {
        self.replay = true;
        self
    }
}

/// Renders binlog files as text
pub trait LogDecoder: Send + Sync {
    /// Start decoding; the returned stream yields the dump text
    fn decode(&self, request: &DecodeRequest) -> Result<DecodedStream>;
}

/// Text produced by a decoder, possibly backed by a running process
pub struct DecodedStream {
    reader: Box<dyn Read + Send>,
    process: Option<ToolProcess>,
}

impl DecodedStream {
    /// Stream over an in-memory or already-open reader
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        DecodedStream {
            reader: Box::new(reader),
            process: None,
        }
    }

    /// Stream over a process's stdout
    pub fn from_process(mut process: ToolProcess) -> Result<Self> {
        let stdout = process.take_stdout()?;
        Ok(DecodedStream {
            reader: Box::new(stdout),
            process: Some(process),
        })
    }

    /// Call after reading to the end: surfaces the decoder's exit status
    pub fn finish(self) -> Result<()> {
        let DecodedStream { reader, process } = self;
        drop(reader);
        match process {
            Some(process) => process.wait(),
            None => Ok(()),
        }
    }

    /// Stop early, discarding the rest of the output
    pub fn abort(self) {
        let DecodedStream { reader, process } = self;
        drop(reader);
        if let Some(process) = process {
            process.abort();
        }
    }
}

impl Read for DecodedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Visit `(position, header)` of every event until `visit` returns a value
fn find_header<R: BufRead, T>(
    mut reader: R,
    mut visit: impl FnMut(u64, &EventHeader) -> Option<T>,
) -> Result<Option<T>> {
    let mut pending: Option<u64> = None;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if let Some(position) = parse_position_line(line) {
            pending = Some(position);
            continue;
        }
        if let Some(position) = pending.take() {
            if let Some(header) = EventHeader::parse(line, position)? {
                if let Some(found) = visit(position, &header) {
                    return Ok(Some(found));
                }
            }
        }
    }
}

/// Time of the first non-synthetic event in decoded text
pub fn first_event_timestamp<R: BufRead>(reader: R) -> Result<Option<i64>> {
    find_header(reader, |_, header| {
        (!header.is_synthetic()).then_some(header.timestamp)
    })
}

/// Offset of the first real event in text decoded with a start-time filter.
///
/// The format description event at offset 4 is always printed regardless of
/// the filter and is skipped, as are synthetic events.
pub fn first_event_position<R: BufRead>(reader: R) -> Result<Option<u64>> {
    find_header(reader, |position, header| {
        (position != FORMAT_DESCRIPTION_POSITION && !header.is_synthetic()).then_some(position)
    })
}

fn scan<T>(
    decoder: &dyn LogDecoder,
    request: &DecodeRequest,
    parse: impl FnOnce(BufReader<&mut DecodedStream>) -> Result<Option<T>>,
) -> Result<Option<T>> {
    let mut stream = decoder.decode(request)?;
    match parse(BufReader::new(&mut stream)) {
        Ok(Some(found)) => {
            stream.abort();
            Ok(Some(found))
        }
        Ok(None) => {
            stream.finish()?;
            Ok(None)
        }
        Err(e) => {
            stream.abort();
            Err(e)
        }
    }
}

/// Decode `file` and return the time of its first event
pub fn file_first_event_ts(decoder: &dyn LogDecoder, file: impl Into<PathBuf>) -> Result<Option<i64>> {
    let request = DecodeRequest::for_files([file]);
    scan(decoder, &request, |r| first_event_timestamp(r))
}

/// Offset of the first event in `file` at or after `ts`, if any
pub fn event_position_at_or_after(
    decoder: &dyn LogDecoder,
    file: impl Into<PathBuf>,
    ts: i64,
) -> Result<Option<u64>> {
    let request = DecodeRequest::for_files([file]).start_at_time(ts);
    scan(decoder, &request, |r| first_event_position(r))
}
