//! Byte-level progress of a running recovery
//!
//! The orchestrator owns an `Arc<RecoveryProgress>`; callers clone the `Arc`
//! and poll it from another thread. Counters only grow within one recovery
//! and are reset when the next one starts.

use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for the restore and replay phases
#[derive(Debug, Default)]
pub struct RecoveryProgress {
    restored_bytes: AtomicU64,
    restore_total_bytes: AtomicU64,
    replayed_bytes: AtomicU64,
    replay_total_bytes: AtomicU64,
}

/// Point-in-time copy of [`RecoveryProgress`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Backup bytes executed so far
    pub restored_bytes: u64,
    /// Size of the backup payload
    pub restore_total_bytes: u64,
    /// Decoded binlog bytes handed to the replay sink so far
    pub replayed_bytes: u64,
    /// Combined size of the binlog files being replayed. Decoded text is
    /// usually larger, so this is a lower bound for `replayed_bytes` at the end.
    pub replay_total_bytes: u64,
}

impl RecoveryProgress {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Backup bytes executed so far
    pub fn restored_bytes(&self) -> u64 {
        self.restored_bytes.load(Ordering::Relaxed)
    }

    /// Decoded binlog bytes replayed so far
    pub fn replayed_bytes(&self) -> u64 {
        self.replayed_bytes.load(Ordering::Relaxed)
    }

    /// Copy all counters
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            restored_bytes: self.restored_bytes.load(Ordering::Relaxed),
            restore_total_bytes: self.restore_total_bytes.load(Ordering::Relaxed),
            replayed_bytes: self.replayed_bytes.load(Ordering::Relaxed),
            replay_total_bytes: self.replay_total_bytes.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.restored_bytes,
            &self.restore_total_bytes,
            &self.replayed_bytes,
            &self.replay_total_bytes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn set_restore_total(&self, bytes: u64) {
        self.restore_total_bytes.store(bytes, Ordering::Relaxed);
    }

    pub(crate) fn set_replay_total(&self, bytes: u64) {
        self.replay_total_bytes.store(bytes, Ordering::Relaxed);
    }

    pub(crate) fn restore_reader<R: Read>(&self, inner: R) -> CountingReader<'_, R> {
        CountingReader::new(inner, &self.restored_bytes)
    }

    pub(crate) fn replay_reader<R: Read>(&self, inner: R) -> CountingReader<'_, R> {
        CountingReader::new(inner, &self.replayed_bytes)
    }
}

/// Adds every byte read from `inner` to a shared counter
pub struct CountingReader<'a, R> {
    inner: R,
    counter: &'a AtomicU64,
}

impl<'a, R: Read> CountingReader<'a, R> {
    /// Count reads of `inner` into `counter`
    pub fn new(inner: R, counter: &'a AtomicU64) -> Self {
        CountingReader { inner, counter }
    }
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counting_reader() {
        let progress = Arc::new(RecoveryProgress::new());
        let observer = Arc::clone(&progress);

        let mut out = Vec::new();
        progress
            .replay_reader(&b"0123456789"[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(observer.replayed_bytes(), 10);
        assert_eq!(observer.restored_bytes(), 0);
    }

    #[test]
    fn test_reset_and_snapshot() {
        let progress = RecoveryProgress::new();
        progress.set_restore_total(100);
        progress.set_replay_total(7);
        let mut sink = Vec::new();
        progress
            .restore_reader(&[1u8; 40][..])
            .read_to_end(&mut sink)
            .unwrap();

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.restored_bytes, 40);
        assert_eq!(snapshot.restore_total_bytes, 100);
        assert_eq!(snapshot.replay_total_bytes, 7);
        assert_eq!(
            serde_json::to_value(snapshot).unwrap()["restored_bytes"],
            serde_json::json!(40)
        );

        progress.reset();
        assert_eq!(progress.snapshot(), ProgressSnapshot::default());
    }
}
