// End-to-end ingestion scenarios through the public API

use std::cell::Cell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use meet_ledger::audit::{entries_by_kind, entries_for_meet};
use meet_ledger::dates::{display_date, parse_ddmmyyyy, to_ddmmyyyy};
use meet_ledger::parser::{layout, Field};
use meet_ledger::queue::{self, QueueItem, QueueStatus};
use meet_ledger::retry::retry_on_lock;
use meet_ledger::{
    import_archive, open_database, record_discovered, record_download, registry_counts, setup_database,
    ArchiveIngestor, AuditKind, DiscoveredMeet, IngestError, IngestReport, ItemProcessor,
    MeetLedger, RegionDirectory, RetryPolicy, RunSummary, Scheduler, TeamRegistry,
};
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// FIXTURES
// ============================================================================

fn record(tag: &str, fields: &[(Field, &str)]) -> String {
    let mut buf: Vec<char> = tag.chars().collect();
    for (field, value) in fields {
        if buf.len() < field.end() {
            buf.resize(field.end(), ' ');
        }
        for (i, c) in value.chars().take(field.len).enumerate() {
            buf[field.start - 1 + i] = c;
        }
    }
    buf.into_iter().collect()
}

fn result_document(meet_name: &str, start: &str) -> String {
    [
        record(
            "B1",
            &[
                (layout::MEET_NAME, meet_name),
                (layout::MEET_LOCATION, "Waterworld"),
                (layout::MEET_START, start),
                (layout::MEET_END, start),
            ],
        ),
        record("B2", &[(layout::MEET_TYPE_CODE, "01"), (layout::COURSE_CODE, "S")]),
        record(
            "C1",
            &[
                (layout::TEAM_CODE, "HAM"),
                (layout::TEAM_NAME, "Hamilton Swim Club"),
                (layout::TEAM_REGION_CODE, "WK"),
            ],
        ),
        swimmer("F", "Jane", "Doe", "NZ100", "05031998"),
        swimmer("M", "Tom", "Ngata", "", "11112005"),
        record(
            "C1",
            &[
                (layout::TEAM_CODE, "XYZ"),
                (layout::TEAM_NAME, "Far Away Aquatics"),
                (layout::TEAM_REGION_CODE, "QQ"),
            ],
        ),
        swimmer("F", "Ana", "Silva", "NZ200", "01012004"),
        "E1 an event result line we do not read".to_string(),
    ]
    .join("\r\n")
}

fn swimmer(gender: &str, first: &str, last: &str, registry: &str, birth: &str) -> String {
    record(
        "D1",
        &[
            (layout::GENDER, gender),
            (layout::LAST_NAME, last),
            (layout::FIRST_NAME, first),
            (layout::REGISTRY_NUMBER, registry),
            (layout::BIRTH_DATE, birth),
        ],
    )
}

fn write_zip(path: &Path, files: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, contents) in files {
        zip.start_file(*name, zip::write::FileOptions::default()).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

struct Workspace {
    inbox: TempDir,
    results: TempDir,
    conn: Connection,
}

impl Workspace {
    fn new() -> Self {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        Workspace {
            inbox: tempfile::tempdir().unwrap(),
            results: tempfile::tempdir().unwrap(),
            conn,
        }
    }

    /// Build an archive in the inbox and import it. Returns the meet id.
    fn import(&self, file_name: &str, files: &[(&str, &str)]) -> i64 {
        let source = self.inbox.path().join(file_name);
        write_zip(&source, files);
        import_archive(&self.conn, &source, self.results.path(), "Waikato")
            .unwrap()
            .meet_id
    }

    fn run(&self) -> RunSummary {
        self.run_with(ingestor())
    }

    fn run_with<P: ItemProcessor>(&self, processor: P) -> RunSummary {
        Scheduler::new(&self.conn, processor, RetryPolicy::immediate(3))
            .run()
            .unwrap()
    }
}

fn regions() -> RegionDirectory {
    RegionDirectory::from_json_str(r#"{"Waikato": ["WK"], "Auckland": ["AK"]}"#).unwrap()
}

fn ingestor() -> ArchiveIngestor {
    ArchiveIngestor::new(regions())
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_reparsing_is_idempotent() {
    let ws = Workspace::new();
    let doc = result_document("Waikato Winter Champs", "07062025");
    let meet_id = ws.import("winter.zip", &[("Winter.hy3", &doc)]);

    assert_eq!(ws.run().done, 1);
    let first = registry_counts(&ws.conn).unwrap();
    assert_eq!(first.teams, 2);
    assert_eq!(first.participants, 3);
    assert_eq!(first.meet_team_participants, 3);

    queue::enqueue(&ws.conn, meet_id).unwrap();
    assert_eq!(ws.run().done, 1);
    assert_eq!(registry_counts(&ws.conn).unwrap(), first);
}

#[test]
fn test_discovery_dedups_by_url() {
    let ws = Workspace::new();
    let candidate = DiscoveredMeet {
        region: "Waikato".to_string(),
        url: "https://results.example/meets/123.zip".to_string(),
        meet_name: "Winter Champs".to_string(),
        meet_date: Some("07 Jun 2025".to_string()),
        meet_year: Some(2025),
    };

    let a = record_discovered(&ws.conn, &candidate).unwrap();
    let b = record_discovered(&ws.conn, &candidate).unwrap();
    assert_eq!(a, b);
    assert_eq!(MeetLedger::new(&ws.conn).all().unwrap().len(), 1);
}

#[test]
fn test_download_and_import_dedup_by_path() {
    let ws = Workspace::new();
    let url = "https://results.example/meets/123.zip";
    record_discovered(
        &ws.conn,
        &DiscoveredMeet {
            region: "Waikato".to_string(),
            url: url.to_string(),
            meet_name: "Winter Champs".to_string(),
            meet_date: None,
            meet_year: None,
        },
    )
    .unwrap();
    record_download(&ws.conn, url, "results/Waikato/123.zip").unwrap();
    record_download(&ws.conn, url, "results/Waikato/123.zip").unwrap();

    let doc = result_document("Relays", "01022025");
    let a = ws.import("relays.zip", &[("r.hy3", &doc)]);
    let b = ws.import("relays.zip", &[("r.hy3", &doc)]);
    assert_eq!(a, b);

    assert_eq!(MeetLedger::new(&ws.conn).all().unwrap().len(), 2);
    assert_eq!(queue::status_counts(&ws.conn).unwrap().pending, 2);
}

#[test]
fn test_canonical_collision_flags_without_merging() {
    let ws = Workspace::new();
    let doc = result_document("Waikato Winter Champs", "07062025");
    let a = ws.import("winter-day1.zip", &[("Winter.hy3", &doc)]);
    let b = ws.import("winter-copy.zip", &[("Winter.hy3", &doc)]);

    assert_eq!(ws.run().done, 2);

    let ledger = MeetLedger::new(&ws.conn);
    let meet_a = ledger.get(a).unwrap().unwrap();
    let meet_b = ledger.get(b).unwrap().unwrap();
    assert!(meet_a.parsed && meet_b.parsed);
    assert_eq!(meet_a.canonical_identity(), meet_b.canonical_identity());

    // Re-parsing both sides does not add a second entry for the same pair
    queue::enqueue(&ws.conn, a).unwrap();
    queue::enqueue(&ws.conn, b).unwrap();
    ws.run();

    let duplicates = entries_by_kind(&ws.conn, AuditKind::DuplicateMeet).unwrap();
    assert_eq!(duplicates.len(), 1);
    let context = duplicates[0].context.as_ref().unwrap();
    let mut ids = vec![
        context["existing_meet_id"].as_i64().unwrap(),
        context["new_meet_id"].as_i64().unwrap(),
    ];
    ids.sort();
    assert_eq!(ids, vec![a, b]);
    assert_eq!(ledger.all().unwrap().len(), 2);
}

#[test]
fn test_region_codes_fall_back_to_empty() {
    let directory = regions();
    assert_eq!(directory.resolve("WK"), "Waikato");
    assert_eq!(directory.resolve("QQ"), "");

    let ws = Workspace::new();
    let doc = result_document("Waikato Winter Champs", "07062025");
    let meet_id = ws.import("winter.zip", &[("Winter.hy3", &doc)]);
    assert_eq!(ws.run().done, 1);

    let teams = TeamRegistry::new(&ws.conn);
    let ham = teams.find("HAM", "Hamilton Swim Club").unwrap().unwrap();
    let far = teams.find("XYZ", "Far Away Aquatics").unwrap().unwrap();
    assert_eq!(ham.region, "Waikato");
    assert_eq!(far.region, "");

    let warnings: Vec<_> = entries_for_meet(&ws.conn, meet_id)
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == AuditKind::DataQualityWarning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("QQ"));
}

#[test]
fn test_birth_date_round_trip() {
    let date = parse_ddmmyyyy("05031998").unwrap();
    assert_eq!(date, NaiveDate::from_ymd_opt(1998, 3, 5).unwrap());
    assert_eq!(to_ddmmyyyy(date), "05031998");
    assert_eq!(display_date(date), "05 Mar 1998");
}

/// Reports a busy store for one meet, every time; delegates otherwise.
struct BusyFor {
    meet_id: i64,
    calls: Cell<u32>,
    inner: ArchiveIngestor,
}

impl ItemProcessor for BusyFor {
    fn process(&self, conn: &Connection, item: &QueueItem) -> meet_ledger::Result<IngestReport> {
        if item.meet_id == self.meet_id {
            self.calls.set(self.calls.get() + 1);
            return Err(IngestError::Store(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                Some("database is locked".to_string()),
            )));
        }
        self.inner.process(conn, item)
    }
}

#[test]
fn test_retry_exhaustion_fails_item_and_continues() {
    let ws = Workspace::new();
    let doc = result_document("Waikato Winter Champs", "07062025");
    let locked = ws.import("locked.zip", &[("a.hy3", &doc)]);
    let fine = ws.import("fine.zip", &[("b.hy3", &result_document("Relays", "01022025"))]);

    let processor = BusyFor {
        meet_id: locked,
        calls: Cell::new(0),
        inner: ingestor(),
    };
    let summary = Scheduler::new(&ws.conn, &processor, RetryPolicy::immediate(3))
        .run()
        .unwrap();

    assert_eq!(processor.calls.get(), 3);
    assert_eq!(summary.done, 1);
    assert_eq!(summary.failed, 1);

    let item = queue::item_for_meet(&ws.conn, locked).unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Error);
    assert!(item.error.unwrap().contains("3 attempts"));
    let entries = entries_for_meet(&ws.conn, locked).unwrap();
    assert!(entries.iter().any(|e| e.kind == AuditKind::LockRetryExhausted));

    let next = queue::item_for_meet(&ws.conn, fine).unwrap().unwrap();
    assert_eq!(next.status, QueueStatus::Done);
}

#[test]
fn test_bad_archive_then_good_archive() {
    let ws = Workspace::new();
    let empty = ws.import("empty.zip", &[("readme.txt", "no results in here")]);
    let good = ws.import(
        "good.zip",
        &[("Good.hy3", &result_document("Waikato Winter Champs", "07062025"))],
    );

    let summary = ws.run();
    assert_eq!(
        summary,
        RunSummary {
            recovered: 0,
            done: 1,
            failed: 1
        }
    );

    let failed = queue::item_for_meet(&ws.conn, empty).unwrap().unwrap();
    assert_eq!(failed.status, QueueStatus::Error);
    let entries = entries_for_meet(&ws.conn, empty).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, AuditKind::MissingResultDocument);

    let done = queue::item_for_meet(&ws.conn, good).unwrap().unwrap();
    assert_eq!(done.status, QueueStatus::Done);
    let counts = registry_counts(&ws.conn).unwrap();
    assert_eq!(counts.teams, 2);
    assert_eq!(counts.participants, 3);
    assert_eq!(counts.meet_teams, 2);

    // The meet row keeps the archive's facts, the failed one stays unparsed
    let ledger = MeetLedger::new(&ws.conn);
    assert!(ledger.get(good).unwrap().unwrap().parsed);
    assert!(!ledger.get(empty).unwrap().unwrap().parsed);
    assert_eq!(
        ledger.get(good).unwrap().unwrap().file_path.map(PathBuf::from),
        Some(ws.results.path().join("Waikato").join("good.zip"))
    );
}

#[test]
fn test_writer_on_second_connection_is_transient_contention() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("meets.db");
    // No driver-level waiting, so contention surfaces at once
    let conn = open_database(&db_path, Duration::ZERO).unwrap();

    let source = dir.path().join("winter.zip");
    let doc = result_document("Waikato Winter Champs", "07062025");
    write_zip(&source, &[("Winter.hy3", &doc)]);
    let meet_id = import_archive(&conn, &source, &dir.path().join("results"), "Waikato")
        .unwrap()
        .meet_id;
    let item = queue::claim_next(&conn).unwrap().unwrap();

    let blocker = Connection::open(&db_path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

    let processor = ingestor();
    let err = processor.process(&conn, &item).unwrap_err();
    assert!(err.is_transient(), "expected busy error, got {:?}", err);

    let exhausted = retry_on_lock("ingest meet", &RetryPolicy::immediate(2), |_| {
        processor.process(&conn, &item)
    });
    match exhausted {
        Err(IngestError::LockRetryExhausted { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected LockRetryExhausted, got {:?}", other.map(|r| r.meet_id)),
    }
    assert_eq!(registry_counts(&conn).unwrap().teams, 0);

    blocker.execute_batch("ROLLBACK").unwrap();
    let report = processor.process(&conn, &item).unwrap();
    assert_eq!(report.meet_id, meet_id);
    assert_eq!(registry_counts(&conn).unwrap().teams, 2);
}
