//! Recovering into a fresh database next to the original

use crate::common::*;
use pitr::{PitrError, RecoveryRequest, RecoveryState};

#[test]
fn test_recover_into_new_database() {
    let world = World::new();
    let request = RecoveryRequest::into_new_database("shop", "shop_copy", T0 + 130, SUFFIX);
    let outcome = world
        .recovery
        .recover(&request, &[world.standard_backup()])
        .unwrap();

    assert_eq!(outcome.recovered_database, "shop_copy");
    assert_eq!(outcome.retired_database, None);
    assert_eq!(world.server.rows("shop_copy", "orders"), vec!["(1)"]);
    assert_eq!(world.server.rows("shop", "orders").len(), 5);
    assert!(!world.server.database_exists("shop_pitr_1652237293"));
    assert!(!world
        .server
        .statements()
        .iter()
        .any(|s| s.sql.starts_with("RENAME TABLE") || s.sql.contains("sql_log_bin")));

    let decode = world.decoder.requests().pop().unwrap();
    assert_eq!(
        decode.rewrite_db,
        Some(("shop".to_string(), "shop_copy".to_string()))
    );
}

#[test]
fn test_existing_empty_target_is_reused() {
    let world = World::new();
    world.server.create_database("shop_copy");
    let request = RecoveryRequest::into_new_database("shop", "shop_copy", T0 + 130, SUFFIX);
    world
        .recovery
        .recover(&request, &[world.standard_backup()])
        .unwrap();
    assert_eq!(world.server.tables("shop_copy"), vec!["orders"]);
}

#[test]
fn test_target_with_tables_is_rejected() {
    let world = World::new();
    world.server.create_table("shop_copy", "keep_me", &["id"]);
    let request = RecoveryRequest::into_new_database("shop", "shop_copy", T0 + 130, SUFFIX);

    let err = world
        .recovery
        .recover(&request, &[world.standard_backup()])
        .unwrap_err();
    assert!(matches!(err, PitrError::PreconditionFailed { .. }));
    assert_eq!(world.recovery.state(), RecoveryState::Failed);
    assert_eq!(world.server.tables("shop_copy"), vec!["keep_me"]);
    assert!(world.sink.replays().is_empty());
}
