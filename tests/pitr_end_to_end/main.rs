//! End-to-end tests for point-in-time recovery.
//!
//! Every test drives `PitrRecovery` against the in-memory server, a scripted
//! decoder and binlog files served from a temporary directory, from the
//! binlog download through the final swap.

#[path = "../common/mod.rs"]
mod common;

mod in_place;
mod naming;
mod new_database;
mod resolution;
