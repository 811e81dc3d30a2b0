//! Textual binlog parsing for point-in-time recovery
//!
//! This crate turns the text produced by `mysqlbinlog -v` into structured
//! data and back into undo SQL:
//!
//! - [`header`]: `# at` markers and event header lines
//! - [`event`]: the closed event vocabulary
//! - [`rows`]: strict decoding of row images
//! - [`stream`]: grouping events into transactions
//! - [`filter`]: selecting one session's transactions
//! - [`rollback`]: synthesizing SQL that undoes a transaction

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event;
pub mod filter;
pub mod header;
pub mod rollback;
pub mod rows;
pub mod stream;

pub use event::{Event, EventKind};
pub use filter::{matches_thread, transactions_for_thread};
pub use header::{parse_position_line, EventHeader, POSITION_MARKER};
pub use rollback::{invert_rows, rollback_sql, rollback_statements, RollbackStatement, TableCatalog};
pub use rows::{decode_rows, DmlKind, RowsEvent};
pub use stream::{BoundaryStrategy, QueryEventBoundary, StreamSplitter, Transaction, Transactions};
