//! In-place recovery: restore, replay, swap

use crate::common::*;
use pitr::{BinlogInfo, PitrError, RecoveryRequest, RecoveryState};

const SIDE: &str = "shop_pitr_1652237293";
const RETIRED: &str = "shop_pitr_1652237293_old";

// ============================================================================
// Full Recovery
// ============================================================================

#[test]
fn test_recover_in_place() {
    let world = World::new();
    let backup = world.standard_backup();
    let request = RecoveryRequest::in_place("shop", T0 + 130, SUFFIX);

    let outcome = world.recovery.recover(&request, &[backup]).unwrap();
    assert_eq!(outcome.backup_id, 1);
    assert_eq!(outcome.target.sequence, 2);
    assert_eq!(outcome.recovered_database, "shop");
    assert_eq!(outcome.retired_database.as_deref(), Some(RETIRED));
    assert_eq!(world.recovery.state(), RecoveryState::Done);

    // The backup's tables are live, the old ones retired, the side database drained
    assert_eq!(world.server.rows("shop", "orders"), vec!["(1)"]);
    assert_eq!(world.server.rows(RETIRED, "orders").len(), 5);
    assert!(world.server.database_exists(SIDE));
    assert!(world.server.tables(SIDE).is_empty());
}

#[test]
fn test_replay_window_and_rewrite() {
    let world = World::new();
    let request = RecoveryRequest::in_place("shop", T0 + 130, SUFFIX);
    world
        .recovery
        .recover(&request, &[world.standard_backup()])
        .unwrap();

    let replays = world.sink.replays();
    assert_eq!(replays.len(), 1);
    let text = &replays[0];
    assert!(text.contains(&format!("INSERT INTO `{}`.`orders`", SIDE)));
    assert!(!text.contains("INSERT INTO `shop`.`orders`"));
    // Row 1 is in the backup, rows 4 and 5 are after the target
    assert!(!text.contains("@1=1\n"));
    assert!(text.contains("@1=2\n"));
    assert!(text.contains("@1=3\n"));
    assert!(!text.contains("@1=4\n"));
    assert!(!text.contains("@1=5\n"));

    let decode = world.decoder.requests().pop().unwrap();
    assert!(decode.replay);
    assert_eq!(decode.start_position, Some(world.backup_pos));
    assert_eq!(decode.stop_ts, Some(T0 + 130));
    assert_eq!(
        decode.rewrite_db,
        Some(("shop".to_string(), SIDE.to_string()))
    );
    assert_eq!(decode.database.as_deref(), Some(SIDE));
    let dir = world.recovery.log_directory();
    assert_eq!(
        decode.files,
        vec![dir.file_path("binlog.000001"), dir.file_path("binlog.000002")]
    );
}

#[test]
fn test_only_the_swap_skips_the_binlog() {
    let world = World::new();
    world
        .recovery
        .recover(
            &RecoveryRequest::in_place("shop", T0 + 130, SUFFIX),
            &[world.standard_backup()],
        )
        .unwrap();

    let statements = world.server.statements();
    let restore = statements
        .iter()
        .find(|s| s.sql.starts_with("INSERT INTO `orders`"))
        .unwrap();
    assert!(restore.binlog);
    let rename = statements
        .iter()
        .find(|s| s.sql.starts_with("RENAME TABLE"))
        .unwrap();
    assert!(!rename.binlog);
    assert_eq!(
        rename.sql,
        format!(
            "RENAME TABLE `shop`.`orders` TO `{}`.`orders`, `{}`.`orders` TO `shop`.`orders`",
            RETIRED, SIDE
        )
    );

    // The restore ran on a session whose default database is the side database
    assert!(world.server.sessions().contains(&Some(SIDE.to_string())));
    assert!(world.server.commits() >= 1);
}

#[test]
fn test_progress_counts_both_phases() {
    let world = World::new();
    let outcome = world
        .recovery
        .recover(
            &RecoveryRequest::in_place("shop", T0 + 130, SUFFIX),
            &[world.standard_backup()],
        )
        .unwrap();

    let (files, _) = standard_history();
    let snapshot = world.recovery.progress().snapshot();
    assert_eq!(snapshot.restored_bytes, BACKUP_SQL.len() as u64);
    assert_eq!(snapshot.restore_total_bytes, BACKUP_SQL.len() as u64);
    assert_eq!(
        snapshot.replay_total_bytes,
        (files[0].1.len() + files[1].1.len()) as u64
    );
    assert_eq!(snapshot.replayed_bytes, outcome.replayed_bytes);
    assert!(outcome.replayed_bytes > 0);
}

// ============================================================================
// Swap Edge Cases
// ============================================================================

#[test]
fn test_swap_is_noop_when_both_databases_are_empty() {
    let world = World::with_history(standard_history());
    world.server.create_database("shop");
    let backup = world.backup(
        1,
        BinlogInfo::new("binlog.000001", world.backup_pos),
        "-- empty schema\n/*!40101 SET NAMES utf8mb4 */;\n",
    );

    let outcome = world
        .recovery
        .recover(&RecoveryRequest::in_place("shop", T0 + 130, SUFFIX), &[backup])
        .unwrap();
    assert_eq!(outcome.retired_database, None);
    assert!(!world.server.database_exists(RETIRED));
    assert!(!world
        .server
        .statements()
        .iter()
        .any(|s| s.sql.starts_with("RENAME TABLE")));
    assert_eq!(world.recovery.state(), RecoveryState::Done);
}

#[test]
fn test_dropped_original_is_recreated() {
    let world = World::with_history(standard_history());
    let outcome = world
        .recovery
        .recover(
            &RecoveryRequest::in_place("shop", T0 + 130, SUFFIX),
            &[world.standard_backup()],
        )
        .unwrap();
    assert_eq!(world.server.rows("shop", "orders"), vec!["(1)"]);
    assert_eq!(outcome.retired_database.as_deref(), Some(RETIRED));
    assert!(world.server.tables(RETIRED).is_empty());
}

#[test]
fn test_rename_failure_needs_an_operator() {
    let world = World::new();
    world.server.fail_on("RENAME TABLE");
    let err = world
        .recovery
        .recover(
            &RecoveryRequest::in_place("shop", T0 + 130, SUFFIX),
            &[world.standard_backup()],
        )
        .unwrap_err();
    assert!(matches!(err, PitrError::SwapPartialFailure { .. }));
    assert!(!err.is_retryable_by_caller());
    assert_eq!(world.recovery.state(), RecoveryState::Failed);
}

#[test]
fn test_retired_database_can_be_deleted_afterwards() {
    let world = World::new();
    world
        .recovery
        .recover(
            &RecoveryRequest::in_place("shop", T0 + 130, SUFFIX),
            &[world.standard_backup()],
        )
        .unwrap();
    assert_eq!(
        world.recovery.delete_retired_database("shop", SUFFIX).unwrap(),
        RETIRED
    );
    assert!(!world.server.database_exists(RETIRED));
    assert_eq!(world.server.rows("shop", "orders"), vec!["(1)"]);
}
