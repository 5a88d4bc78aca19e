//! Integration tests for single-table export against SQLite with injected faults

mod common;

use common::*;
use dbsalvage_core::{DatabaseDriver, Ident};
use dbsalvage_extract::{
    ChunkedTableExporter, ExportMode, TableExportRequest, TableStatus, WriteMode, probe,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::Path;
use std::sync::Arc;

fn ident(name: &str) -> Ident {
    Ident::new(name).unwrap()
}

struct Harness {
    driver: Arc<FaultyDriver>,
    sink: Arc<RecordingSink>,
    exporter: ChunkedTableExporter,
    supervisor: Arc<dbsalvage_extract::ConnectionSupervisor>,
}

fn harness(driver: FaultyDriver, db: &Path, sink: RecordingSink) -> Harness {
    let driver = Arc::new(driver);
    let sink = Arc::new(sink);
    let supervisor = supervisor(driver.clone(), db);
    let exporter = ChunkedTableExporter::new(
        supervisor.clone(),
        driver.export_dialect(),
        sink.clone(),
    );
    Harness {
        driver,
        sink,
        exporter,
        supervisor,
    }
}

fn chunked(table: &str, chunk_size: u64) -> TableExportRequest {
    TableExportRequest::new(ident(table), ExportMode::Chunked { chunk_size })
}

#[tokio::test]
async fn test_scenario_three_pages_success() {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(dir.path(), &table_sql("T", &["A", "B", "C", "D"], 25)).await;
    let h = harness(
        FaultyDriver::healthy(),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    let outcome = h
        .exporter
        .export(conn, &chunked("T", 10).with_max_columns(4))
        .await;

    assert_eq!(outcome.result.status, TableStatus::Success);
    assert_eq!(outcome.result.rows_exported, 25);
    assert!(outcome.result.quarantined_columns.is_empty());
    assert!(outcome.connection.is_some());

    let writes = h.sink.writes_to("T.csv");
    let shape: Vec<(WriteMode, usize)> = writes.iter().map(|w| (w.mode, w.rows)).collect();
    assert_eq!(
        shape,
        vec![
            (WriteMode::Create, 10),
            (WriteMode::Append, 10),
            (WriteMode::Append, 5),
        ]
    );

    let content = h.sink.read("T.csv");
    assert!(content.starts_with("A,B,C,D\n1,b1,c1,d1\n"));
    assert_eq!(data_lines(&content).len(), 25);
}

#[tokio::test]
async fn test_scenario_poisoned_column_is_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(dir.path(), &table_sql("T2", &["X", "Y", "Z"], 5)).await;
    let h = harness(
        FaultyDriver::new(vec![Poison::always("X")]),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    let outcome = h.exporter.export(conn, &chunked("T2", 10)).await;

    assert_eq!(outcome.result.status, TableStatus::Partial);
    assert_eq!(outcome.result.quarantined_columns, vec![ident("X")]);
    assert_eq!(outcome.result.rows_exported, 5);

    let writes = h.sink.writes_to("T2.csv");
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].mode, WriteMode::Create);
    assert_eq!(writes[0].columns, vec!["Y", "Z"]);

    let content = h.sink.read("T2.csv");
    assert_eq!(
        content,
        "Y,Z\ny1,z1\ny2,z2\ny3,z3\ny4,z4\ny5,z5\n"
    );
}

#[tokio::test]
async fn test_probe_splits_good_and_bad_in_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(dir.path(), &table_sql("T2", &["X", "Y", "Z"], 5)).await;
    let h = harness(
        FaultyDriver::new(vec![Poison::always("X")]),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    let connects_before = h.driver.connects();
    let dialect = h.driver.export_dialect();
    let report = probe::probe(
        &h.supervisor,
        dialect.as_ref(),
        conn,
        &ident("T2"),
        10,
        &[ident("X"), ident("Y"), ident("Z")],
    )
    .await
    .unwrap();

    assert_eq!(report.good, vec![ident("Y"), ident("Z")]);
    assert_eq!(report.bad, vec![ident("X")]);
    // one reconnect, after the failed column
    assert_eq!(h.driver.connects(), connects_before + 1);
    assert!(!report.connection.is_closed());
    assert_eq!(h.driver.queries_matching("LIMIT").len(), 3);
}

#[rstest]
#[case("A")]
#[case("B")]
#[case("D")]
#[tokio::test]
async fn test_quarantine_isolates_exactly_the_poisoned_column(#[case] poisoned: &str) {
    let dir = tempfile::tempdir().unwrap();
    let columns = ["A", "B", "C", "D"];
    let db = fixture_db(dir.path(), &table_sql("T", &columns, 12)).await;
    let h = harness(
        FaultyDriver::new(vec![Poison::always(poisoned)]),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    let outcome = h.exporter.export(conn, &chunked("T", 5)).await;

    assert_eq!(outcome.result.status, TableStatus::Partial);
    assert_eq!(outcome.result.quarantined_columns, vec![ident(poisoned)]);

    let expected_header: Vec<&str> = columns.iter().copied().filter(|c| *c != poisoned).collect();
    let content = h.sink.read("T.csv");
    assert_eq!(content.lines().next().unwrap(), expected_header.join(","));
    assert_eq!(data_lines(&content).len(), 12);
}

#[rstest]
#[case(0, 10, 1)]
#[case(19, 10, 2)]
#[case(20, 10, 3)]
#[case(7, 3, 3)]
#[case(1, 1, 2)]
#[tokio::test]
async fn test_chunk_completeness(
    #[case] rows: usize,
    #[case] chunk_size: u64,
    #[case] expected_pages: usize,
) {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(dir.path(), &table_sql("T", &["ID", "V"], rows)).await;
    let h = harness(
        FaultyDriver::healthy(),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    let outcome = h.exporter.export(conn, &chunked("T", chunk_size)).await;
    assert_eq!(outcome.result.status, TableStatus::Success);

    assert_eq!(h.sink.writes_to("T.csv").len(), expected_pages);

    let content = h.sink.read("T.csv");
    let ids: Vec<usize> = data_lines(&content)
        .iter()
        .map(|l| l.split(',').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(ids, (1..=rows).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_empty_table_writes_header_only() {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(dir.path(), &table_sql("EMPTY", &["ID", "V"], 0)).await;
    let h = harness(
        FaultyDriver::healthy(),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    let outcome = h.exporter.export(conn, &chunked("EMPTY", 10)).await;

    assert_eq!(outcome.result.status, TableStatus::Success);
    assert_eq!(outcome.result.rows_exported, 0);
    assert_eq!(h.sink.read("EMPTY.csv"), "ID,V\n");
}

#[tokio::test]
async fn test_resume_after_interruption_matches_single_pass() {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(dir.path(), &table_sql("T", &["ID", "V"], 23)).await;

    // single pass
    let full = harness(
        FaultyDriver::healthy(),
        &db,
        RecordingSink::new(&dir.path().join("full")),
    );
    let conn = full.supervisor.acquire().await.unwrap();
    full.exporter.export(conn, &chunked("T", 5)).await;

    // first pass dies on the third page write, after 10 rows
    let out = dir.path().join("resumed");
    let first = harness(
        FaultyDriver::healthy(),
        &db,
        RecordingSink::failing_on_write(&out, 3),
    );
    let conn = first.supervisor.acquire().await.unwrap();
    let interrupted = first.exporter.export(conn, &chunked("T", 5)).await;
    assert_eq!(interrupted.result.status, TableStatus::Failed);
    assert_eq!(interrupted.result.rows_exported, 10);

    // second pass resumes at the interruption point
    let second = harness(FaultyDriver::healthy(), &db, RecordingSink::new(&out));
    let conn = second.supervisor.acquire().await.unwrap();
    let resumed = second
        .exporter
        .export(conn, &chunked("T", 5).with_resume_offset(10))
        .await;
    assert_eq!(resumed.result.status, TableStatus::Success);
    assert_eq!(resumed.result.rows_exported, 13);
    assert!(
        second
            .sink
            .writes_to("T.csv")
            .iter()
            .all(|w| w.mode == WriteMode::Append)
    );

    assert_eq!(second.sink.read("T.csv"), full.sink.read("T.csv"));
}

#[tokio::test]
async fn test_wide_table_is_split_into_continuation_files() {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(
        dir.path(),
        &table_sql("W", &["C1", "C2", "C3", "C4", "C5"], 7),
    )
    .await;
    let h = harness(
        FaultyDriver::healthy(),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    let outcome = h
        .exporter
        .export(conn, &chunked("W", 4).with_max_columns(2))
        .await;
    assert_eq!(outcome.result.status, TableStatus::Success);
    assert_eq!(outcome.result.rows_exported, 7);

    assert!(h.sink.read("W.csv").starts_with("C1,C2\n1,c21\n"));
    assert!(h.sink.read("W_cont1.csv").starts_with("C3,C4\n"));
    assert!(h.sink.read("W_cont2.csv").starts_with("C5\n"));
    for file in ["W.csv", "W_cont1.csv", "W_cont2.csv"] {
        let writes = h.sink.writes_to(file);
        assert_eq!(writes.len(), 2, "{file}");
        assert_eq!(writes[0].mode, WriteMode::Create);
        assert_eq!(writes[1].mode, WriteMode::Append);
        assert_eq!(data_lines(&h.sink.read(file)).len(), 7);
    }
}

#[tokio::test]
async fn test_whole_mode_reads_each_group_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(dir.path(), &table_sql("T", &["ID", "V"], 23)).await;
    let h = harness(
        FaultyDriver::healthy(),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    let request =
        TableExportRequest::new(ident("T"), ExportMode::Whole).with_resume_offset(10);
    let outcome = h.exporter.export(conn, &request).await;

    assert_eq!(outcome.result.status, TableStatus::Success);
    assert_eq!(outcome.result.rows_exported, 23);
    let writes = h.sink.writes_to("T.csv");
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].mode, WriteMode::Create);
    assert!(h.driver.queries_matching("LIMIT").is_empty());
}

#[tokio::test]
async fn test_columns_override_exports_single_group() {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(dir.path(), &table_sql("T", &["ID", "V", "W"], 3)).await;
    let h = harness(
        FaultyDriver::healthy(),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    let request = chunked("T", 10)
        .with_max_columns(1)
        .with_columns(vec![ident("W"), ident("ID")]);
    let outcome = h.exporter.export(conn, &request).await;

    assert_eq!(outcome.result.status, TableStatus::Success);
    assert_eq!(h.sink.read("T.csv"), "W,ID\nw1,1\nw2,2\nw3,3\n");
    assert!(h.driver.queries_matching("pragma_table_info").is_empty());
}

#[tokio::test]
async fn test_failure_beyond_probe_sample_fails_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(dir.path(), &table_sql("T", &["ID", "X"], 25)).await;
    let h = harness(
        FaultyDriver::new(vec![Poison::from_offset("X", 10)]),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    let outcome = h.exporter.export(conn, &chunked("T", 10)).await;

    assert_eq!(outcome.result.status, TableStatus::Failed);
    assert!(outcome.result.quarantined_columns.is_empty());
    assert!(
        outcome
            .result
            .error
            .as_deref()
            .unwrap()
            .contains("failed again after quarantine")
    );
    assert!(outcome.connection.is_none());
    assert_eq!(data_lines(&h.sink.read("T.csv")).len(), 10);
}

#[tokio::test]
async fn test_mid_table_quarantine_keeps_header_layout() {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(dir.path(), &table_sql("T", &["ID", "X", "Y"], 25)).await;
    let h = harness(
        FaultyDriver::new(vec![Poison::after_successes("X", 1)]),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    let outcome = h.exporter.export(conn, &chunked("T", 10)).await;

    assert_eq!(outcome.result.status, TableStatus::Partial);
    assert_eq!(outcome.result.quarantined_columns, vec![ident("X")]);
    assert_eq!(outcome.result.rows_exported, 25);

    let content = h.sink.read("T.csv");
    assert!(content.starts_with("ID,X,Y\n"));
    let lines = data_lines(&content);
    assert_eq!(lines.len(), 25);
    for line in &lines {
        assert_eq!(line.split(',').count(), 3, "line {line:?}");
    }
    assert!(lines.contains(&"10,x10,y10"));
    assert!(lines.contains(&"11,,y11"));
    assert!(lines.contains(&"25,,y25"));

    let writes = h.sink.writes_to("T.csv");
    assert!(writes.iter().all(|w| w.columns == vec!["ID", "X", "Y"]));
}

#[tokio::test]
async fn test_no_surviving_column_fails_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(dir.path(), &table_sql("T", &["X"], 3)).await;
    let h = harness(
        FaultyDriver::new(vec![Poison::always("X")]),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    let outcome = h.exporter.export(conn, &chunked("T", 10)).await;

    assert_eq!(outcome.result.status, TableStatus::Failed);
    assert_eq!(outcome.result.quarantined_columns, vec![ident("X")]);
    assert!(outcome.connection.is_some());
    assert!(h.sink.writes_to("T.csv").is_empty());
}

#[tokio::test]
async fn test_exhaustion_during_recovery_fails_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let db = fixture_db(dir.path(), &table_sql("T2", &["X", "Y"], 5)).await;
    let h = harness(
        FaultyDriver::new(vec![Poison::always("X")]),
        &db,
        RecordingSink::new(&dir.path().join("csv")),
    );

    let conn = h.supervisor.acquire().await.unwrap();
    h.driver.refuse_next(100);
    let outcome = h.exporter.export(conn, &chunked("T2", 10)).await;

    assert_eq!(outcome.result.status, TableStatus::Failed);
    assert!(outcome.connection.is_none());
    assert!(
        outcome
            .result
            .error
            .as_deref()
            .unwrap()
            .contains("Connection exhausted")
    );
}
