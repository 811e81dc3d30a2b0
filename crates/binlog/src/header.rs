//! Position markers and event header lines
//!
//! The decoder prints each event as
//!
//! ```text
//! # at 772
//! #221017 14:25:24 server id 1  end_log_pos 916 CRC32 0x896854fc 	Write_rows: table id 259 flags: STMT_END_F
//! ...body...
//! ```

use pitr_core::time::parse_header_datetime;
use pitr_core::{PitrError, Result};

/// Prefix of the line that starts every event
pub const POSITION_MARKER: &str = "# at ";

/// Parse a `# at <offset>` line.
///
/// Returns `None` for anything else, including statement text in an event
/// body that happens to start with `# at `.
pub fn parse_position_line(line: &str) -> Option<u64> {
    let rest = line.strip_prefix(POSITION_MARKER)?;
    let offset = rest.trim_end();
    if offset.is_empty() || !offset.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    offset.parse().ok()
}

/// Parsed event header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    /// Event time (unix seconds, decoded in local time)
    pub timestamp: i64,
    /// Originating server
    pub server_id: u64,
    /// Offset just past this event; 0 for synthetic events
    pub end_log_pos: u64,
    /// Event type name such as `Query` or `Write_rows`; empty if not printed
    pub event_type: String,
    /// Remaining `key=value` tokens after the type name
    pub tokens: Vec<String>,
}

impl EventHeader {
    /// Parse a header line for the event at `position`.
    ///
    /// Lines without `server id` are not headers and yield `Ok(None)`. A line
    /// that mentions `server id` but lacks the expected layout is malformed.
    pub fn parse(line: &str, position: u64) -> Result<Option<Self>> {
        if !line.contains("server id") {
            return Ok(None);
        }
        let malformed = |reason: &str| PitrError::malformed(position, format!("{}: {:?}", reason, line));

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 7 {
            return Err(malformed("header has too few fields"));
        }
        if fields[0].len() != 7 || !fields[0].starts_with('#') {
            return Err(malformed("header does not start with #YYMMDD"));
        }
        if fields[2] != "server" || fields[3] != "id" || fields[5] != "end_log_pos" {
            return Err(malformed("header lacks server id / end_log_pos"));
        }

        let timestamp = parse_header_datetime(&fields[0][1..], fields[1])
            .ok_or_else(|| malformed("invalid header time"))?;
        let server_id = fields[4]
            .parse::<u64>()
            .map_err(|_| malformed("invalid server id"))?;
        let end_log_pos = fields[6]
            .parse::<u64>()
            .map_err(|_| malformed("invalid end_log_pos"))?;

        let mut rest = &fields[7..];
        if rest.first() == Some(&"CRC32") {
            rest = rest.get(2..).unwrap_or(&[]);
        }
        let (event_type, tokens) = match rest.split_first() {
            Some((ty, tokens)) => (
                ty.trim_end_matches(':').to_string(),
                tokens.iter().map(|t| t.to_string()).collect(),
            ),
            None => (String::new(), Vec::new()),
        };

        Ok(Some(EventHeader {
            timestamp,
            server_id,
            end_log_pos,
            event_type,
            tokens,
        }))
    }

    /// Synthetic events (rotate/format markers) have `end_log_pos 0`
    pub fn is_synthetic(&self) -> bool {
        self.end_log_pos == 0
    }

    /// Value of the `thread_id=<digits>` token, if present
    pub fn thread_id(&self) -> Option<&str> {
        self.tokens.iter().find_map(|t| {
            let id = t.strip_prefix("thread_id=")?;
            (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then_some(id)
        })
    }
}
