//! What the server reports about its own binlog

use pitr_core::{BinlogInfo, LogFile, PitrError, Result};

use crate::connection::SqlConnection;

const SHOW_BINARY_LOGS: &str = "SHOW BINARY LOGS";
const SHOW_MASTER_STATUS: &str = "SHOW MASTER STATUS";

/// Binlog files the server still retains, with their current sizes
pub fn remote_inventory(conn: &mut dyn SqlConnection) -> Result<Vec<LogFile>> {
    let rows = conn.query(SHOW_BINARY_LOGS)?;
    rows.iter()
        .map(|row| {
            let name = row
                .get("Log_name")
                .ok_or_else(|| PitrError::database(SHOW_BINARY_LOGS, "row has no Log_name"))?;
            let size = row
                .get("File_size")
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| {
                    PitrError::database(SHOW_BINARY_LOGS, format!("bad File_size for {}", name))
                })?;
            LogFile::new(name, size)
        })
        .collect()
}

/// Current write position of the binlog; empty when binary logging is off
pub fn binlog_position(conn: &mut dyn SqlConnection) -> Result<BinlogInfo> {
    let rows = conn.query(SHOW_MASTER_STATUS)?;
    let Some(row) = rows.first() else {
        return Ok(BinlogInfo::default());
    };
    let file = row
        .get("File")
        .ok_or_else(|| PitrError::database(SHOW_MASTER_STATUS, "row has no File"))?;
    let position = row
        .get("Position")
        .and_then(|p| p.parse::<u64>().ok())
        .ok_or_else(|| PitrError::database(SHOW_MASTER_STATUS, "bad Position"))?;
    Ok(BinlogInfo::new(file, position))
}
