//! Structured binlog events
//!
//! An event is a header line plus the body lines up to the next `# at`
//! marker. The event vocabulary is closed: DML rows events, QUERY events
//! (which open transactions) and everything else.

use pitr_core::{PitrError, Result};

use crate::header::EventHeader;
use crate::rows::{decode_rows, DmlKind, RowsEvent};

/// Kind of a binlog event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `Write_rows`
    Insert,
    /// `Update_rows`
    Update,
    /// `Delete_rows`
    Delete,
    /// `Query`, carrying the session thread id
    Query {
        /// `thread_id=` token of the header
        thread_id: String,
    },
    /// Any other event type (`Table_map`, `Xid`, GTID events, ...)
    Other {
        /// Type name as printed by the decoder
        event_type: String,
    },
}

impl EventKind {
    /// Classify a header; `None` if the header names no event type
    fn classify(header: &EventHeader, position: u64) -> Result<Option<Self>> {
        let ty = header.event_type.as_str();
        let kind = if ty.is_empty() {
            return Ok(None);
        } else if ty.starts_with("Write_rows") {
            EventKind::Insert
        } else if ty.starts_with("Update_rows") {
            EventKind::Update
        } else if ty.starts_with("Delete_rows") {
            EventKind::Delete
        } else if ty == "Query" {
            let thread_id = header.thread_id().ok_or_else(|| {
                PitrError::malformed(position, "query event header has no thread_id")
            })?;
            EventKind::Query {
                thread_id: thread_id.to_string(),
            }
        } else {
            EventKind::Other {
                event_type: ty.to_string(),
            }
        };
        Ok(Some(kind))
    }

    /// DML kind for rows events
    pub fn dml(&self) -> Option<DmlKind> {
        match self {
            EventKind::Insert => Some(DmlKind::Insert),
            EventKind::Update => Some(DmlKind::Update),
            EventKind::Delete => Some(DmlKind::Delete),
            EventKind::Query { .. } | EventKind::Other { .. } => None,
        }
    }
}

/// One binlog event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Offset from the `# at` marker
    pub position: u64,
    /// Classified kind
    pub kind: EventKind,
    /// Parsed header
    pub header: EventHeader,
    /// Header line including its newline
    pub raw_header: String,
    /// Body lines, each including its newline
    pub raw_body: String,
}

impl Event {
    /// Build an event from its header line and body.
    ///
    /// Returns `Ok(None)` for events that carry no usable type and for
    /// synthetic (`end_log_pos 0`) events; both are dropped by the splitter.
    pub fn parse(position: u64, header_line: &str, raw_body: String) -> Result<Option<Self>> {
        let Some(header) = EventHeader::parse(header_line, position)? else {
            return Ok(None);
        };
        if header.is_synthetic() {
            return Ok(None);
        }
        let Some(kind) = EventKind::classify(&header, position)? else {
            return Ok(None);
        };
        Ok(Some(Event {
            position,
            kind,
            header,
            raw_header: format!("{}\n", header_line),
            raw_body,
        }))
    }

    /// True for INSERT, UPDATE and DELETE events
    pub fn is_dml(&self) -> bool {
        self.kind.dml().is_some()
    }

    /// True for QUERY events
    pub fn is_query(&self) -> bool {
        matches!(self.kind, EventKind::Query { .. })
    }

    /// Thread id of a QUERY event
    pub fn thread_id(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Query { thread_id } => Some(thread_id),
            _ => None,
        }
    }

    /// Decode the row images of a DML event; `Ok(None)` for other kinds
    pub fn rows(&self) -> Result<Option<RowsEvent>> {
        match self.kind.dml() {
            Some(kind) => decode_rows(kind, &self.raw_body, self.position).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: &str = "#221017 14:25:24 server id 1  end_log_pos";

    #[test]
    fn test_classify_kinds() {
        let cases = [
            ("Write_rows: table id 259 flags: STMT_END_F", "insert"),
            ("Update_rows: table id 259 flags: STMT_END_F", "update"),
            ("Delete_rows: table id 259 flags: STMT_END_F", "delete"),
            ("Query	thread_id=7	exec_time=0	error_code=0", "query"),
            ("Table_map: `db`.`t` mapped to number 259", "other"),
            ("Xid = 148408", "other"),
        ];
        for (suffix, expected) in cases {
            let line = format!("{} 916 CRC32 0x896854fc 	{}", TS, suffix);
            let event = Event::parse(841, &line, String::new()).unwrap().unwrap();
            let got = match event.kind {
                EventKind::Insert => "insert",
                EventKind::Update => "update",
                EventKind::Delete => "delete",
                EventKind::Query { .. } => "query",
                EventKind::Other { .. } => "other",
            };
            assert_eq!(got, expected, "{line}");
        }
    }

    #[test]
    fn test_query_without_thread_id_is_malformed() {
        let line = format!("{} 772 CRC32 0xa7f6c4ac 	Query	exec_time=0	error_code=0", TS);
        assert!(matches!(
            Event::parse(697, &line, String::new()),
            Err(PitrError::MalformedLogEvent { position: 697, .. })
        ));
    }

    #[test]
    fn test_synthetic_and_untyped_events_dropped() {
        let synthetic = "#221017 14:25:24 server id 1  end_log_pos 0 CRC32 0x00000000 	Rotate to binlog.000002  pos: 4";
        assert!(Event::parse(4, synthetic, String::new()).unwrap().is_none());
        assert!(Event::parse(4, "# [empty]", String::new()).unwrap().is_none());
        let untyped = format!("{} 916", TS);
        assert!(Event::parse(4, &untyped, String::new()).unwrap().is_none());
    }

    #[test]
    fn test_rows_decoded_lazily() {
        let line = format!("{} 916 CRC32 0x896854fc 	Write_rows: table id 259 flags: STMT_END_F", TS);
        let body = "### INSERT INTO `db`.`t`\n### SET\n###   @1=1\n".to_string();
        let event = Event::parse(841, &line, body).unwrap().unwrap();
        assert!(event.is_dml());
        assert_eq!(event.raw_header, format!("{}\n", line));
        let rows = event.rows().unwrap().unwrap();
        assert_eq!(rows.rows_after, vec![vec!["1".to_string()]]);
    }
}
