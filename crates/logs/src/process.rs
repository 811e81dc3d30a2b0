//! Child processes for external tools
//!
//! Stderr is drained on a background thread so a chatty tool cannot block
//! on a full pipe while the caller is busy with its stdout.

use std::io::Read;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use pitr_core::{PitrError, Result};
use tracing::debug;

/// A spawned external tool
pub struct ToolProcess {
    name: String,
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

impl ToolProcess {
    /// Spawn `command` with piped stdout and stderr, and optionally piped stdin
    pub fn spawn(name: impl Into<String>, mut command: Command, pipe_stdin: bool) -> Result<Self> {
        let name = name.into();
        command
            .stdin(if pipe_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(tool = %name, ?command, "spawning");

        let mut child = command
            .spawn()
            .map_err(|e| PitrError::tool(&name, format!("failed to start: {}", e)))?;
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });
        Ok(ToolProcess {
            name,
            child,
            stderr,
        })
    }

    /// Tool name used in errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the child's stdin
    pub fn take_stdin(&mut self) -> Result<ChildStdin> {
        self.child
            .stdin
            .take()
            .ok_or_else(|| PitrError::tool(&self.name, "stdin is not piped"))
    }

    /// Take the child's stdout
    pub fn take_stdout(&mut self) -> Result<ChildStdout> {
        self.child
            .stdout
            .take()
            .ok_or_else(|| PitrError::tool(&self.name, "stdout already taken"))
    }

    /// Wait for exit; a non-zero status becomes `ExternalToolFailure` with stderr attached
    pub fn wait(mut self) -> Result<()> {
        drop(self.child.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| PitrError::tool(&self.name, format!("wait failed: {}", e)))?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if status.success() {
            debug!(tool = %self.name, "exited successfully");
            return Ok(());
        }
        Err(PitrError::tool(
            &self.name,
            format!("{}: {}", status, stderr.trim()),
        ))
    }

    /// Kill the process after a failure on the caller's side
    pub fn abort(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[test]
    fn test_success() {
        let mut process = ToolProcess::spawn("sh", sh("echo hello"), false).unwrap();
        let mut out = String::new();
        process.take_stdout().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello\n");
        process.wait().unwrap();
    }

    #[test]
    fn test_failure_carries_stderr() {
        let process = ToolProcess::spawn("sh", sh("echo broken >&2; exit 3"), false).unwrap();
        match process.wait() {
            Err(PitrError::ExternalToolFailure { tool, reason }) => {
                assert_eq!(tool, "sh");
                assert!(reason.contains("broken"), "{reason}");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_stdin_pipe() {
        let mut process = ToolProcess::spawn("sh", sh("cat"), true).unwrap();
        let mut stdin = process.take_stdin().unwrap();
        let mut stdout = process.take_stdout().unwrap();
        stdin.write_all(b"piped").unwrap();
        drop(stdin);
        let mut out = String::new();
        stdout.read_to_string(&mut out).unwrap();
        assert_eq!(out, "piped");
        process.wait().unwrap();
    }

    #[test]
    fn test_missing_binary() {
        let result = ToolProcess::spawn("nope", Command::new("/nonexistent/tool"), false);
        assert!(matches!(result, Err(PitrError::ExternalToolFailure { .. })));
    }
}
