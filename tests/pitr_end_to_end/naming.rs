//! Side and retired database names

use crate::common::*;
use pitr::RecoveryRequest;

#[test]
fn test_long_database_name_keeps_suffix() {
    let world = World::with_history(standard_history());
    let database = "a".repeat(60);
    world.server.create_table(&database, "orders", &["id"]);

    let backup = world.standard_backup();
    let plan = world
        .recovery
        .plan(&RecoveryRequest::in_place(&database, T0 + 130, SUFFIX), &[backup])
        .unwrap();

    assert_eq!(plan.side_database.chars().count(), 64);
    assert_eq!(
        plan.side_database,
        format!("{}_pitr_1652237293", "a".repeat(48))
    );
    let retired = plan.retired_database.unwrap();
    assert_eq!(retired.chars().count(), 64);
    assert_eq!(retired, format!("{}_pitr_1652237293_old", "a".repeat(44)));
}

#[test]
fn test_plan_lowercases_binlog_name_when_server_folds_case() {
    let world = World::with_history(standard_history());
    world.server.set_variable("lower_case_table_names", "1");
    world.server.create_table("Shop", "orders", &["id"]);

    let plan = world
        .recovery
        .plan(
            &RecoveryRequest::in_place("Shop", T0 + 130, SUFFIX),
            &[world.standard_backup()],
        )
        .unwrap();
    assert_eq!(plan.binlog_database, "shop");
    assert_eq!(plan.side_database, "Shop_pitr_1652237293");
    assert_eq!(plan.replay_files.len(), 2);
}
