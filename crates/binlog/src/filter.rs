//! Selecting the transactions of one session

use pitr_core::{PitrError, Result};

use crate::stream::Transaction;

/// Check whether `txn` was issued by session `thread_id`.
///
/// An empty transaction never matches. A transaction that does not open
/// with a QUERY event is malformed.
pub fn matches_thread(txn: &Transaction, thread_id: &str) -> Result<bool> {
    let Some(first) = txn.events.first() else {
        return Ok(false);
    };
    match first.thread_id() {
        Some(id) => Ok(id == thread_id),
        None => Err(PitrError::malformed(
            first.position,
            "transaction does not start with a query event",
        )),
    }
}

/// Keep the transactions of `thread_id` that changed rows.
///
/// DDL-only transactions of the same session carry no row images and are
/// dropped.
pub fn transactions_for_thread(
    txns: impl IntoIterator<Item = Transaction>,
    thread_id: &str,
) -> Result<Vec<Transaction>> {
    let mut kept = Vec::new();
    for txn in txns {
        if matches_thread(&txn, thread_id)? && txn.has_dml() {
            kept.push(txn);
        }
    }
    Ok(kept)
}
