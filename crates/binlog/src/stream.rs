//! Splitting a decoded binlog stream into transactions
//!
//! A `# at <offset>` line ends the previous event and starts a new one. The
//! line after it is the header; everything up to the next marker is body.
//! Events that open a transaction (QUERY events by default) close the
//! transaction being accumulated; other events join the open transaction.
//! Events seen while no transaction is open are dropped.
//!
//! # Example
//!
//! ```ignore
//! let splitter = StreamSplitter::new().with_size_limit(8 << 20);
//! for txn in splitter.transactions(BufReader::new(child_stdout)) {
//!     let txn = txn?;
//!     println!("{} events", txn.events.len());
//! }
//! ```

use std::io::BufRead;

use pitr_core::{PitrError, Result};
use tracing::trace;

use crate::event::Event;
use crate::header::parse_position_line;

/// An ordered group of events forming one unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    /// Events in log order, starting with the boundary event
    pub events: Vec<Event>,
}

impl Transaction {
    /// Thread id of the opening QUERY event, if any
    pub fn thread_id(&self) -> Option<&str> {
        self.events.first().and_then(Event::thread_id)
    }

    /// True if at least one event is INSERT, UPDATE or DELETE
    pub fn has_dml(&self) -> bool {
        self.events.iter().any(Event::is_dml)
    }

    /// Offset of the first event
    pub fn start_position(&self) -> Option<u64> {
        self.events.first().map(|e| e.position)
    }

    /// `end_log_pos` of the last event
    pub fn end_position(&self) -> Option<u64> {
        self.events.last().map(|e| e.header.end_log_pos)
    }
}

/// Decides which events open a new transaction
pub trait BoundaryStrategy {
    /// True if `event` starts a new transaction
    fn starts_transaction(&self, event: &Event) -> bool;
}

/// Every QUERY event (normally `BEGIN`) opens a transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEventBoundary;

impl BoundaryStrategy for QueryEventBoundary {
    fn starts_transaction(&self, event: &Event) -> bool {
        event.is_query()
    }
}

/// Groups decoded events into transactions
#[derive(Debug, Clone, Default)]
pub struct StreamSplitter<B = QueryEventBoundary> {
    boundary: B,
    size_limit: Option<u64>,
}

impl StreamSplitter<QueryEventBoundary> {
    /// Splitter using QUERY events as boundaries and no size limit
    pub fn new() -> Self {
        StreamSplitter {
            boundary: QueryEventBoundary,
            size_limit: None,
        }
    }
}

impl<B: BoundaryStrategy> StreamSplitter<B> {
    /// Use a different boundary strategy
    pub fn with_boundary<C: BoundaryStrategy>(self, boundary: C) -> StreamSplitter<C> {
        StreamSplitter {
            boundary,
            size_limit: self.size_limit,
        }
    }

    /// Fail once more than `limit` bytes of text have been read
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// Lazily yield transactions from `reader`
    pub fn transactions<R: BufRead>(&self, reader: R) -> Transactions<'_, R, B> {
        Transactions {
            splitter: self,
            reader,
            bytes_read: 0,
            pending: None,
            open: None,
            finished: false,
        }
    }

    /// Read `reader` to the end and collect every transaction
    pub fn split<R: BufRead>(&self, reader: R) -> Result<Vec<Transaction>> {
        self.transactions(reader).collect()
    }

    /// Split an in-memory dump
    pub fn split_str(&self, text: &str) -> Result<Vec<Transaction>> {
        self.split(text.as_bytes())
    }
}

struct PendingEvent {
    position: u64,
    header: Option<String>,
    body: String,
}

/// Iterator over the transactions of a stream
pub struct Transactions<'a, R, B> {
    splitter: &'a StreamSplitter<B>,
    reader: R,
    bytes_read: u64,
    pending: Option<PendingEvent>,
    open: Option<Transaction>,
    finished: bool,
}

impl<'a, R: BufRead, B: BoundaryStrategy> Transactions<'a, R, B> {
    fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.bytes_read += n as u64;
        if let Some(limit) = self.splitter.size_limit {
            if self.bytes_read > limit {
                return Err(PitrError::SizeLimitExceeded { limit });
            }
        }
        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Finish the pending event; returns a transaction it closed
    fn close_event(&mut self) -> Result<Option<Transaction>> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };
        let Some(header) = pending.header else {
            return Ok(None);
        };
        let Some(event) = Event::parse(pending.position, &header, pending.body)? else {
            trace!(position = pending.position, "dropping untyped event");
            return Ok(None);
        };

        if self.splitter.boundary.starts_transaction(&event) {
            let closed = self.open.replace(Transaction {
                events: vec![event],
            });
            return Ok(closed);
        }
        match self.open.as_mut() {
            Some(txn) => txn.events.push(event),
            None => trace!(position = event.position, "dropping event outside a transaction"),
        }
        Ok(None)
    }

    fn next_transaction(&mut self) -> Result<Option<Transaction>> {
        loop {
            let Some(line) = self.read_line()? else {
                let closed = self.close_event()?;
                return Ok(closed.or_else(|| self.open.take()));
            };

            if let Some(position) = parse_position_line(&line) {
                let closed = self.close_event()?;
                self.pending = Some(PendingEvent {
                    position,
                    header: None,
                    body: String::new(),
                });
                if closed.is_some() {
                    return Ok(closed);
                }
                continue;
            }

            if let Some(pending) = self.pending.as_mut() {
                if pending.header.is_none() {
                    pending.header = Some(line);
                } else {
                    pending.body.push_str(&line);
                    pending.body.push('\n');
                }
            }
        }
    }
}

impl<'a, R: BufRead, B: BoundaryStrategy> Iterator for Transactions<'a, R, B> {
    type Item = Result<Transaction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_transaction() {
            Ok(Some(txn)) => Some(Ok(txn)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn query(pos: u64, thread: u32) -> String {
        format!(
            "# at {pos}\n#221017 14:25:24 server id 1  end_log_pos {} CRC32 0xa7f6c4ac 	Query	thread_id={thread}	exec_time=0	error_code=0\nSET TIMESTAMP=1665987924/*!*/;\nBEGIN\n/*!*/;\n",
            pos + 75
        )
    }

    fn insert(pos: u64, id: u32) -> String {
        format!(
            "# at {pos}\n#221017 14:25:24 server id 1  end_log_pos {} CRC32 0x896854fc 	Write_rows: table id 259 flags: STMT_END_F\n### INSERT INTO `db`.`t`\n### SET\n###   @1={id}\n",
            pos + 75
        )
    }

    fn xid(pos: u64) -> String {
        format!(
            "# at {pos}\n#221017 14:25:24 server id 1  end_log_pos {} CRC32 0x46e23e31 	Xid = 148408\nCOMMIT/*!*/;\n",
            pos + 31
        )
    }

    #[test]
    fn test_split_two_transactions() {
        let text = format!(
            "DELIMITER /*!*/;\n{}{}{}{}{}{}",
            query(100, 1),
            insert(200, 1),
            xid(300),
            query(400, 2),
            insert(500, 2),
            xid(600)
        );
        let txns = StreamSplitter::new().split_str(&text).unwrap();
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].thread_id(), Some("1"));
        assert_eq!(txns[1].thread_id(), Some("2"));
        assert_eq!(txns[0].events.len(), 3);
        assert!(matches!(txns[0].events[1].kind, EventKind::Insert));
        assert!(matches!(txns[0].events[2].kind, EventKind::Other { .. }));
        assert_eq!(txns[0].start_position(), Some(100));
        assert_eq!(txns[0].end_position(), Some(331));
        assert_eq!(
            txns[0].events[0].raw_body,
            "SET TIMESTAMP=1665987924/*!*/;\nBEGIN\n/*!*/;\n"
        );
    }

    #[test]
    fn test_marker_like_statement_text_stays_in_body() {
        let ddl = "# at 200\n#221017 14:25:24 server id 1  end_log_pos 290 CRC32 0x1c2d3e4f \tQuery\tthread_id=1\texec_time=0\terror_code=0\nINSERT INTO notes VALUES ('meet\n# at the office\n# at 9 am')\n/*!*/;\n";
        let text = format!("{}{}{}", query(100, 1), ddl, xid(300));
        let txns = StreamSplitter::new().split_str(&text).unwrap();
        assert_eq!(txns.len(), 2);
        assert_eq!(
            txns[1].events[0].raw_body,
            "INSERT INTO notes VALUES ('meet\n# at the office\n# at 9 am')\n/*!*/;\n"
        );
        assert_eq!(txns[1].events.len(), 2);
    }

    #[test]
    fn test_events_before_first_query_dropped() {
        let text = format!("{}{}{}", insert(100, 1), query(200, 3), insert(300, 3));
        let txns = StreamSplitter::new().split_str(&text).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].events.len(), 2);
    }

    #[test]
    fn test_empty_stream() {
        assert!(StreamSplitter::new().split_str("").unwrap().is_empty());
        assert!(StreamSplitter::new()
            .split_str("/*!50530 SET @@SESSION.PSEUDO_SLAVE_MODE=1*/;\n")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_size_limit() {
        let text = format!("{}{}", query(100, 1), insert(200, 1));
        let result = StreamSplitter::new().with_size_limit(64).split_str(&text);
        assert!(matches!(result, Err(PitrError::SizeLimitExceeded { limit: 64 })));
        let ok = StreamSplitter::new()
            .with_size_limit(text.len() as u64)
            .split_str(&text);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_iterator_is_lazy() {
        let text = format!("{}{}{}{}", query(100, 1), insert(200, 1), query(300, 2), "# at 400\n#bad server id\n");
        let splitter = StreamSplitter::new();
        let mut iter = splitter.transactions(text.as_bytes());
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.thread_id(), Some("1"));
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    struct EveryEvent;

    impl BoundaryStrategy for EveryEvent {
        fn starts_transaction(&self, _event: &Event) -> bool {
            true
        }
    }

    #[test]
    fn test_custom_boundary() {
        let text = format!("{}{}{}", query(100, 1), insert(200, 1), xid(300));
        let txns = StreamSplitter::new()
            .with_boundary(EveryEvent)
            .split_str(&text)
            .unwrap();
        assert_eq!(txns.len(), 3);
    }
}
