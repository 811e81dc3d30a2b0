//! Shared test utilities for the end-to-end suites.
//!
//! Builds a server, a binlog history and a backup that agree with each other:
//!
//! - `binlog.000001` starts at T0; inserts id 1 at T0+10 and id 2 at T0+20.
//!   The backup is taken between the two, so it holds row 1 only.
//! - `binlog.000002` starts at T0+100; inserts id 3 at T0+110 and id 4 at T0+150.
//! - `binlog.000003` starts at T0+200; inserts id 5 at T0+210.
//!
//! The live `shop.orders` table holds all five rows.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use pitr_core::{Backup, BinlogInfo, PitrConfig};
use pitr_recovery::testing::{
    DirectoryFetcher, DumpBuilder, InMemoryServer, RecordingSink, ScriptedDecoder,
};
use pitr_recovery::{Capabilities, PitrRecovery};
use tempfile::TempDir;

pub const T0: i64 = 1_652_000_000;
pub const SUFFIX: i64 = 1_652_237_293;

pub const BACKUP_SQL: &str = "\
-- MySQL dump 10.13  Distrib 8.0.30, for Linux (x86_64)
--
-- Host: 127.0.0.1    Database: shop
/*!40101 SET NAMES utf8mb4 */;
CREATE DATABASE /*!32312 IF NOT EXISTS*/ `shop`;
USE `shop`;
DROP TABLE IF EXISTS `orders`;
CREATE TABLE `orders` (
  `id` int NOT NULL,
  PRIMARY KEY (`id`)
) ENGINE=InnoDB;
INSERT INTO `orders` VALUES (1);
";

// ============================================================================
// History
// ============================================================================

/// Three binlog files and the position the backup was taken at
pub fn standard_history() -> (Vec<(String, String)>, u64) {
    let first = DumpBuilder::new(T0).insert(T0 + 10, 7, "shop", "orders", &[&["1"]]);
    let backup_pos = first.next_position();
    let first = first
        .insert(T0 + 20, 7, "shop", "orders", &[&["2"]])
        .rotate(T0 + 100, "binlog.000002")
        .build();
    let second = DumpBuilder::new(T0 + 100)
        .insert(T0 + 110, 7, "shop", "orders", &[&["3"]])
        .insert(T0 + 150, 7, "shop", "orders", &[&["4"]])
        .rotate(T0 + 200, "binlog.000003")
        .build();
    let third = DumpBuilder::new(T0 + 200)
        .insert(T0 + 210, 7, "shop", "orders", &[&["5"]])
        .build();
    let files = vec![
        ("binlog.000001".to_string(), first),
        ("binlog.000002".to_string(), second),
        ("binlog.000003".to_string(), third),
    ];
    (files, backup_pos)
}

// ============================================================================
// World
// ============================================================================

/// A server, its binlog and the recovery wired to both
pub struct World {
    pub tmp: TempDir,
    pub server: InMemoryServer,
    pub decoder: Arc<ScriptedDecoder>,
    pub fetcher: Arc<DirectoryFetcher>,
    pub sink: Arc<RecordingSink>,
    pub recovery: PitrRecovery,
    pub backup_pos: u64,
}

impl World {
    /// The standard history with a populated `shop` database
    pub fn new() -> Self {
        let world = Self::with_history(standard_history());
        world.server.create_table("shop", "orders", &["id"]);
        for id in 1..=5 {
            world.server.insert_row("shop", "orders", &format!("({})", id));
        }
        world
    }

    /// Serve `files` from the server; nothing is downloaded yet
    pub fn with_history((files, backup_pos): (Vec<(String, String)>, u64)) -> Self {
        let tmp = TempDir::new().unwrap();
        let config = PitrConfig::for_testing(tmp.path());
        let remote = tmp.path().join("remote");
        std::fs::create_dir_all(&remote).unwrap();

        let server = InMemoryServer::new();
        let decoder = Arc::new(ScriptedDecoder::new());
        let mut inventory = Vec::new();
        for (name, text) in &files {
            std::fs::write(remote.join(name), text.as_bytes()).unwrap();
            decoder.add_file(config.storage.binlog_dir.join(name), text.clone());
            inventory.push((name.clone(), text.len() as u64));
        }
        let listed: Vec<(&str, u64)> = inventory.iter().map(|(n, s)| (n.as_str(), *s)).collect();
        server.set_binary_logs(&listed);

        let fetcher = Arc::new(DirectoryFetcher::new(remote));
        let sink = Arc::new(RecordingSink::new());
        let recovery = PitrRecovery::new(
            config,
            Capabilities {
                driver: Arc::new(server.clone()),
                decoder: decoder.clone(),
                fetcher: fetcher.clone(),
                sink: sink.clone(),
            },
        )
        .unwrap();

        World {
            tmp,
            server,
            decoder,
            fetcher,
            sink,
            recovery,
            backup_pos,
        }
    }

    /// Write `sql` as a backup payload taken at `binlog`
    pub fn backup(&self, id: u64, binlog: BinlogInfo, sql: &str) -> Backup {
        let path: PathBuf = self.tmp.path().join(format!("backup-{}.sql", id));
        std::fs::write(&path, sql).unwrap();
        Backup::done(id, binlog, path)
    }

    /// The backup taken between the first two inserts
    pub fn standard_backup(&self) -> Backup {
        self.backup(
            1,
            BinlogInfo::new("binlog.000001", self.backup_pos),
            BACKUP_SQL,
        )
    }
}
