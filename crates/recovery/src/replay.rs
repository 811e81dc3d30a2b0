//! Replaying decoded binlog text against the server
//!
//! The decoder's stdout is streamed into a [`ReplaySink`]; nothing is
//! buffered in full. [`MysqlClientSink`] pipes it into the `mysql` command
//! line client. Both processes run concurrently and both exits are awaited;
//! the first failure wins.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::Command;

use pitr_core::{ConnectionConfig, PitrError, Result, ToolsConfig};
use pitr_logs::{DecodeRequest, LogDecoder, ToolProcess};
use tracing::{debug, info};

use crate::progress::RecoveryProgress;

/// Tool name of the command line client
pub const MYSQL: &str = "mysql";

/// Executes a stream of SQL text
pub trait ReplaySink: Send + Sync {
    /// Execute everything `input` yields; returns the number of bytes consumed
    fn apply(&self, input: &mut dyn Read) -> Result<u64>;
}

/// Runs the `mysql` client with the stream on its stdin
#[derive(Debug, Clone)]
pub struct MysqlClientSink {
    program: PathBuf,
    connection: ConnectionConfig,
}

impl MysqlClientSink {
    /// Locate `mysql` through `tools`
    pub fn new(tools: &ToolsConfig, connection: ConnectionConfig) -> Self {
        MysqlClientSink {
            program: tools.tool_path(MYSQL),
            connection,
        }
    }

    /// Client arguments
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--host".to_string(),
            self.connection.host.clone(),
            "--user".to_string(),
            self.connection.user.clone(),
        ];
        if self.connection.port != 0 {
            args.push("--port".to_string());
            args.push(self.connection.port.to_string());
        }
        if !self.connection.password.is_empty() {
            // `--password VALUE` makes the client prompt; only the `=` form works
            args.push(format!("--password={}", self.connection.password));
        }
        args
    }
}

impl ReplaySink for MysqlClientSink {
    fn apply(&self, input: &mut dyn Read) -> Result<u64> {
        let mut command = Command::new(&self.program);
        command.args(self.args());
        let mut process = ToolProcess::spawn(MYSQL, command, true)?;
        let mut stdin = process.take_stdin()?;
        let mut stdout = process.take_stdout()?;
        let drain = std::thread::spawn(move || io::copy(&mut stdout, &mut io::sink()));

        let copied = io::copy(input, &mut stdin);
        drop(stdin);
        // The client's own exit status explains a broken pipe better than the pipe does
        let exited = process.wait();
        let _ = drain.join();
        exited?;
        Ok(copied?)
    }
}

/// Decode `request` and stream it into `sink`, counting replayed bytes.
///
/// The decoder is started first. If the sink fails the decoder is killed and
/// the sink's error is returned; otherwise the decoder's exit status decides.
pub fn replay(
    decoder: &dyn LogDecoder,
    sink: &dyn ReplaySink,
    request: &DecodeRequest,
    progress: &RecoveryProgress,
) -> Result<u64> {
    if !request.replay {
        return Err(PitrError::Config(
            "decode request is not configured for replay".into(),
        ));
    }
    debug!(files = request.files.len(), database = ?request.database, "starting replay");
    let mut stream = decoder.decode(request)?;
    let applied = {
        let mut counted = progress.replay_reader(&mut stream);
        sink.apply(&mut counted)
    };
    match applied {
        Ok(bytes) => {
            stream.finish()?;
            info!(bytes, "replayed binlog");
            Ok(bytes)
        }
        Err(e) => {
            stream.abort();
            Err(e)
        }
    }
}
