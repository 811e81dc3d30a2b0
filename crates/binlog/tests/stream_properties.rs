//! Integration tests for parsing decoded binlog streams
//!
//! These tests verify that:
//! 1. A realistic dump splits into the expected transactions
//! 2. Row image decoding is strict about `@i=` indexes
//! 3. Splitting is associative over transaction boundaries
//! 4. Decoded row counts match the event kind

use pitr_binlog::{
    decode_rows, transactions_for_thread, DmlKind, EventKind, StreamSplitter, Transaction,
};
use pitr_core::PitrError;
use proptest::prelude::*;

const HEADER_JUNK: &str = "\
/*!50530 SET @@SESSION.PSEUDO_SLAVE_MODE=1*/;
/*!50003 SET @OLD_COMPLETION_TYPE=@@COMPLETION_TYPE,COMPLETION_TYPE=0*/;
DELIMITER /*!*/;
# at 4
#221017 14:20:11 server id 1  end_log_pos 126 CRC32 0x8a2e1f0c 	Start: binlog v 4, server v 8.0.30 created 221017 14:20:11
BINLOG '
u0BNYw8BAAAAegAAAH4AAAAAAAQAOC4wLjMwAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA
'/*!*/;
# at 126
#221017 14:20:11 server id 1  end_log_pos 157 CRC32 0x2f5e0c1d 	Previous-GTIDs
# [empty]
";

fn gtid(pos: u64) -> String {
    format!(
        "# at {pos}\n#221017 14:25:24 server id 1  end_log_pos {} CRC32 0x0b8c4a2e 	Anonymous_GTID	last_committed=3	sequence_number=4	rbr_only=yes	original_committed_timestamp=1665987924\n/*!50718 SET TRANSACTION ISOLATION LEVEL READ COMMITTED*//*!*/;\nSET @@SESSION.GTID_NEXT= 'ANONYMOUS'/*!*/;\n",
        pos + 79
    )
}

fn begin(pos: u64, thread: u64) -> String {
    format!(
        "# at {pos}\n#221017 14:25:24 server id 1  end_log_pos {} CRC32 0xa7f6c4ac 	Query	thread_id={thread}	exec_time=0	error_code=0\nSET TIMESTAMP=1665987924/*!*/;\nBEGIN\n/*!*/;\n",
        pos + 75
    )
}

fn ddl(pos: u64, thread: u64, sql: &str) -> String {
    format!(
        "# at {pos}\n#221017 14:25:24 server id 1  end_log_pos {} CRC32 0x5f7a2b11 	Query	thread_id={thread}	exec_time=0	error_code=0	Xid = 11\nSET TIMESTAMP=1665987924/*!*/;\n{sql}\n/*!*/;\n",
        pos + 120
    )
}

fn table_map(pos: u64) -> String {
    format!(
        "# at {pos}\n#221017 14:25:24 server id 1  end_log_pos {} CRC32 0x1c2d3e4f 	Table_map: `db`.`t` mapped to number 259\n",
        pos + 50
    )
}

fn rows_event(pos: u64, kind: DmlKind, rows: &[Vec<u64>]) -> String {
    let (tag, marker) = match kind {
        DmlKind::Insert => ("Write_rows", "INSERT INTO"),
        DmlKind::Update => ("Update_rows", "UPDATE"),
        DmlKind::Delete => ("Delete_rows", "DELETE FROM"),
    };
    let mut text = format!(
        "# at {pos}\n#221017 14:25:24 server id 1  end_log_pos {} CRC32 0x896854fc 	{tag}: table id 259 flags: STMT_END_F\n",
        pos + 60
    );
    for row in rows {
        text.push_str(&format!("### {marker} `db`.`t`\n"));
        let sections: &[&str] = match kind {
            DmlKind::Insert => &["SET"],
            DmlKind::Delete => &["WHERE"],
            DmlKind::Update => &["WHERE", "SET"],
        };
        for section in sections {
            text.push_str(&format!("### {section}\n"));
            for (i, value) in row.iter().enumerate() {
                text.push_str(&format!("###   @{}={}\n", i + 1, value));
            }
        }
    }
    text
}

fn commit(pos: u64) -> String {
    format!(
        "# at {pos}\n#221017 14:25:24 server id 1  end_log_pos {} CRC32 0x46e23e31 	Xid = 148408\nCOMMIT/*!*/;\n",
        pos + 31
    )
}

const TRAILER: &str = "\
SET @@SESSION.GTID_NEXT= 'AUTOMATIC' /* added by mysqlbinlog */ /*!*/;
DELIMITER ;
# End of log file
/*!50003 SET COMPLETION_TYPE=@OLD_COMPLETION_TYPE*/;
";

// ============================================================================
// Realistic Dump
// ============================================================================

fn realistic_dump() -> String {
    let mut text = HEADER_JUNK.to_string();
    text += &gtid(157);
    text += &ddl(236, 53771, "create database db");
    text += &gtid(356);
    text += &ddl(435, 53771, "create table t (id int primary key)");
    text += &gtid(555);
    text += &begin(634, 53771);
    text += &table_map(709);
    text += &rows_event(759, DmlKind::Insert, &[vec![1], vec![2]]);
    text += &commit(819);
    text += &gtid(850);
    text += &begin(929, 58599);
    text += &table_map(1004);
    text += &rows_event(1054, DmlKind::Update, &[vec![2]]);
    text += &commit(1114);
    text += &gtid(1145);
    text += &begin(1224, 53771);
    text += &table_map(1299);
    text += &rows_event(1349, DmlKind::Delete, &[vec![1]]);
    text += &commit(1409);
    text += TRAILER;
    text
}

#[test]
fn test_realistic_dump_splits_on_query_events() {
    let txns = StreamSplitter::new().split_str(&realistic_dump()).unwrap();
    assert_eq!(txns.len(), 5);

    // GTID events trail the previous transaction; they never open one
    let positions: Vec<u64> = txns.iter().filter_map(Transaction::start_position).collect();
    assert_eq!(positions, vec![236, 435, 634, 929, 1224]);

    let third = &txns[2];
    assert!(matches!(third.events[1].kind, EventKind::Other { ref event_type } if event_type == "Table_map"));
    assert!(matches!(third.events[2].kind, EventKind::Insert));
    assert!(matches!(third.events[3].kind, EventKind::Other { ref event_type } if event_type == "Xid"));
}

#[test]
fn test_realistic_dump_thread_filter() {
    let txns = StreamSplitter::new().split_str(&realistic_dump()).unwrap();
    let mine = transactions_for_thread(txns, "53771").unwrap();
    let positions: Vec<u64> = mine.iter().filter_map(Transaction::start_position).collect();
    assert_eq!(positions, vec![634, 1224]);

    let delete = mine[1].events[2].rows().unwrap().unwrap();
    assert_eq!(delete.kind, DmlKind::Delete);
    assert_eq!(delete.rows_before, vec![vec!["1".to_string()]]);
}

#[test]
fn test_trailer_lands_in_last_event_body() {
    let txns = StreamSplitter::new().split_str(&realistic_dump()).unwrap();
    let last = txns.last().unwrap().events.last().unwrap();
    assert!(last.raw_body.starts_with("COMMIT/*!*/;\n"));
    assert!(last.raw_body.ends_with("# End of log file\n/*!50003 SET COMPLETION_TYPE=@OLD_COMPLETION_TYPE*/;\n"));
}

#[test]
fn test_malformed_rows_surface_on_decode_not_split() {
    let mut text = begin(100, 1);
    text += "# at 175\n#221017 14:25:24 server id 1  end_log_pos 260 CRC32 0x3 	Write_rows: table id 1 flags: STMT_END_F\n### INSERT INTO `db`.`t`\n### SET\n###   @2=1\n";
    let txns = StreamSplitter::new().split_str(&text).unwrap();
    assert!(matches!(
        txns[0].events[1].rows(),
        Err(PitrError::MalformedLogEvent { position: 175, .. })
    ));
}

// ============================================================================
// Properties
// ============================================================================

fn kind_strategy() -> impl Strategy<Value = DmlKind> {
    prop_oneof![
        Just(DmlKind::Insert),
        Just(DmlKind::Update),
        Just(DmlKind::Delete)
    ]
}

fn rows_strategy() -> impl Strategy<Value = Vec<Vec<u64>>> {
    (1usize..5).prop_flat_map(|width| {
        proptest::collection::vec(proptest::collection::vec(0u64..1000, width), 1..6)
    })
}

fn transaction_strategy() -> impl Strategy<Value = (u64, Vec<(DmlKind, Vec<Vec<u64>>)>)> {
    (
        1u64..100_000,
        proptest::collection::vec((kind_strategy(), rows_strategy()), 0..4),
    )
}

fn render_transaction(start: u64, thread: u64, events: &[(DmlKind, Vec<Vec<u64>>)]) -> String {
    let mut pos = start;
    let mut text = begin(pos, thread);
    pos += 100;
    for (kind, rows) in events {
        text += &table_map(pos);
        pos += 100;
        text += &rows_event(pos, *kind, rows);
        pos += 100;
    }
    text + &commit(pos)
}

proptest! {
    #[test]
    fn prop_row_count_matches_kind(kind in kind_strategy(), rows in rows_strategy()) {
        let event = rows_event(4, kind, &rows);
        let body: String = event.lines().skip(2).map(|l| format!("{l}\n")).collect();
        let decoded = decode_rows(kind, &body, 4).unwrap();
        match kind {
            DmlKind::Insert => {
                prop_assert!(decoded.rows_before.is_empty());
                prop_assert_eq!(decoded.rows_after.len(), rows.len());
            }
            DmlKind::Delete => {
                prop_assert!(decoded.rows_after.is_empty());
                prop_assert_eq!(decoded.rows_before.len(), rows.len());
            }
            DmlKind::Update => {
                prop_assert_eq!(decoded.rows_before.len(), rows.len());
                prop_assert_eq!(decoded.rows_after.len(), rows.len());
            }
        }
    }

    #[test]
    fn prop_index_violations_rejected(
        kind in kind_strategy(),
        rows in rows_strategy(),
        row_pick in 0usize..100,
        col_pick in 0usize..100,
        bad_index in 0usize..20,
    ) {
        let row = row_pick % rows.len();
        let col = col_pick % rows[row].len();
        prop_assume!(bad_index != col + 1);

        let event = rows_event(4, kind, &rows);
        let body: String = event.lines().skip(2).map(|l| format!("{l}\n")).collect();
        // Corrupt the first data line of the chosen row and column
        let needle = format!("###   @{}={}\n", col + 1, rows[row][col]);
        let block_marker = match kind {
            DmlKind::Insert => "### INSERT INTO",
            DmlKind::Update => "### UPDATE",
            DmlKind::Delete => "### DELETE FROM",
        };
        let block_start = body.match_indices(block_marker).nth(row).map(|(i, _)| i).unwrap();
        let at = block_start + body[block_start..].find(&needle).unwrap();
        let corrupted = format!(
            "{}###   @{}={}\n{}",
            &body[..at],
            bad_index,
            rows[row][col],
            &body[at + needle.len()..]
        );
        let is_malformed = matches!(
            decode_rows(kind, &corrupted, 4),
            Err(PitrError::MalformedLogEvent { .. })
        );
        prop_assert!(is_malformed);
    }

    #[test]
    fn prop_split_is_associative((start_a, events_a) in transaction_strategy(), events_b in proptest::collection::vec((kind_strategy(), rows_strategy()), 0..4)) {
        let a = render_transaction(start_a, 7, &events_a);
        let b = render_transaction(start_a + 10_000, 8, &events_b);
        let splitter = StreamSplitter::new();

        let mut separate = splitter.split_str(&a).unwrap();
        separate.extend(splitter.split_str(&b).unwrap());
        let joined = splitter.split_str(&format!("{a}{b}")).unwrap();

        prop_assert_eq!(joined.len(), 2);
        prop_assert_eq!(joined, separate);
    }
}
