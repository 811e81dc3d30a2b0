//! Mapping target times to coordinates over downloaded files

use crate::common::*;
use pitr_logs::testing::DumpBuilder;
use pitr::{LogCoordinate, PitrError};

#[test]
fn test_sync_downloads_every_file_with_sidecar() {
    let world = World::new();
    let report = world.recovery.sync_logs().unwrap();
    assert_eq!(
        report.downloaded,
        vec!["binlog.000001", "binlog.000002", "binlog.000003"]
    );
    let meta = world
        .recovery
        .log_directory()
        .path()
        .join("binlog.000002.meta");
    let sidecar: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(meta).unwrap()).unwrap();
    assert_eq!(sidecar["first_event_ts"], T0 + 100);

    // A second pass finds everything in place
    let again = world.recovery.sync_logs().unwrap();
    assert!(again.downloaded.is_empty());
    assert_eq!(again.kept.len(), 3);
    assert_eq!(world.fetcher.fetched().len(), 3);
}

#[test]
fn test_target_between_first_two_files_searches_first_file() {
    let world = World::new();
    world.recovery.sync_logs().unwrap();

    let coordinate = world.recovery.resolve(T0 + 15).unwrap();
    assert_eq!(coordinate, LogCoordinate::new(1, world.backup_pos));

    let search = world.decoder.requests().pop().unwrap();
    assert_eq!(
        search.files,
        vec![world.recovery.log_directory().file_path("binlog.000001")]
    );
    assert_eq!(search.start_ts, Some(T0 + 15));
}

#[test]
fn test_target_after_last_event_of_file_resolves_to_its_end() {
    let world = World::new();
    world.recovery.sync_logs().unwrap();
    assert_eq!(
        world.recovery.resolve(T0 + 50).unwrap(),
        LogCoordinate::end_of(1)
    );
}

#[test]
fn test_target_inside_middle_file() {
    let world = World::new();
    world.recovery.sync_logs().unwrap();
    let expected = DumpBuilder::new(T0 + 100)
        .insert(T0 + 110, 7, "shop", "orders", &[&["3"]])
        .next_position();
    assert_eq!(
        world.recovery.resolve(T0 + 130).unwrap(),
        LogCoordinate::new(2, expected)
    );
}

#[test]
fn test_targets_outside_history() {
    let world = World::new();
    world.recovery.sync_logs().unwrap();
    assert!(matches!(
        world.recovery.resolve(T0 - 1),
        Err(PitrError::TargetBeforeRetainedHistory { .. })
    ));
    assert!(matches!(
        world.recovery.resolve(T0 + 3_600),
        Err(PitrError::TargetAfterAllKnownEvents { .. })
    ));
}
