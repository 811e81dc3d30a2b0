//! Binlog file management for point-in-time recovery
//!
//! - [`registry`]: the local directory of downloaded files and their sidecars
//! - [`sync`]: reconciling that directory with the server's inventory
//! - [`decoder`]: the capability that renders binlog files as text
//! - [`resolver`]: mapping a wall-clock time to a `LogCoordinate`
//! - [`mysqlbinlog`]: the production decoder and fetcher
//! - [`process`]: child process handling for external tools
//! - [`testing`]: canned decoder output for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decoder;
pub mod meta;
pub mod mysqlbinlog;
pub mod process;
pub mod registry;
pub mod resolver;
pub mod sync;
pub mod testing;

pub use decoder::{
    event_position_at_or_after, file_first_event_ts, first_event_position, first_event_timestamp,
    DecodeRequest, DecodedStream, LogDecoder,
};
pub use meta::LogFileMeta;
pub use mysqlbinlog::MysqlBinlog;
pub use process::ToolProcess;
pub use registry::{IndexedLogFile, LogDirectory};
pub use resolver::{select_file, CoordinateResolver, FileSelection};
pub use sync::{LogFetcher, LogSync, SyncReport};
