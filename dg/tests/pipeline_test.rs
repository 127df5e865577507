//! Integration tests for the transform pipeline
//!
//! Each test stages rows in a fresh SQLite file, ensures the destination and
//! runs full passes through the public API.

use datagate::{
    CastKind, DatasetSpec, FieldRule, IndexOutcome, IndexSpec, PromotionPolicy, QualifiedName, RawRow, Session,
    TableOutcome, TransformOptions, content_digest, ensure_index, ensure_table, list_rejects, transform_dataset,
    validate,
};
use tempfile::TempDir;

fn people_spec() -> DatasetSpec {
    DatasetSpec::new("people", "main.stage_people", "main.people_typed")
        .field(FieldRule::new("person_id", "person_id", CastKind::Integer).required())
        .field(FieldRule::new("full_name", "full_name", CastKind::Text).required())
        .field(FieldRule::new("created_at", "created_at", CastKind::Date))
        .index(IndexSpec::new("IX_people_typed_person_id", ["person_id"]).unique())
        .index(IndexSpec::new("IX_people_typed_full_name", ["full_name"]))
}

fn open(dir: &TempDir) -> Session {
    Session::open(dir.path().join("ops.db")).expect("Failed to open session")
}

fn stage(session: &Session, rows: &[(Option<&str>, Option<&str>, Option<&str>)]) {
    session
        .conn()
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS stage_people (person_id TEXT NULL, full_name TEXT NULL, created_at TEXT NULL);
             DELETE FROM stage_people;",
        )
        .expect("Failed to create staging table");
    for (id, name, created) in rows {
        session
            .conn()
            .execute(
                "INSERT INTO stage_people (person_id, full_name, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, name, created],
            )
            .expect("Failed to stage row");
    }
}

fn destination(session: &Session) -> Vec<(i64, String, Option<String>)> {
    let mut stmt = session
        .conn()
        .prepare("SELECT person_id, full_name, created_at FROM people_typed ORDER BY person_id")
        .expect("Failed to prepare");
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .expect("Failed to query")
        .collect::<rusqlite::Result<Vec<_>>>()
        .expect("Failed to read rows");
    rows
}

// =============================================================================
// Example scenarios
// =============================================================================

#[test]
fn test_good_row_is_cast_and_promoted() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut session = open(&dir);
    stage(&session, &[(Some("12"), Some("  Jane Doe "), Some("2016-01-01 00:00:00"))]);
    ensure_table(&mut session, &people_spec(), false, None).unwrap();

    let summary = transform_dataset(&mut session, &people_spec(), &TransformOptions::default()).unwrap();

    assert_eq!((summary.scanned, summary.accepted, summary.rejected), (1, 1, 0));
    assert_eq!(
        destination(&session),
        vec![(12, "Jane Doe".to_string(), Some("2016-01-01".to_string()))]
    );
}

#[test]
fn test_unparseable_required_field_is_rejected_with_raw_payload() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut session = open(&dir);
    stage(&session, &[(Some("abc"), Some("John"), Some(""))]);
    ensure_table(&mut session, &people_spec(), false, None).unwrap();

    let options = TransformOptions::default().source_file("people_2016.csv");
    let summary = transform_dataset(&mut session, &people_spec(), &options).unwrap();
    assert_eq!((summary.scanned, summary.accepted, summary.rejected), (1, 0, 1));
    assert!(destination(&session).is_empty());

    let rejects = list_rejects(&session, "people", None).unwrap();
    assert_eq!(rejects.len(), 1);
    let reject = &rejects[0];
    assert_eq!(reject.reject_reasons, "required:person_id");
    assert_eq!(reject.row_num, 1);
    assert_eq!(reject.source_file.as_deref(), Some("people_2016.csv"));
    assert_eq!(
        reject.raw,
        serde_json::json!({"person_id": "abc", "full_name": "John", "created_at": ""})
    );

    let raw = RawRow::new()
        .with("person_id", Some("abc"))
        .with("full_name", Some("John"))
        .with("created_at", Some(""));
    assert_eq!(reject.row_hash, content_digest(&raw).unwrap().to_vec());
}

#[test]
fn test_incremental_run_keeps_existing_key() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut session = open(&dir);
    ensure_table(&mut session, &people_spec(), false, None).unwrap();
    session
        .conn()
        .execute(
            "INSERT INTO people_typed (person_id, full_name, created_at) VALUES (5, 'Original', NULL)",
            [],
        )
        .unwrap();
    stage(&session, &[(Some("5"), Some("New Name"), None)]);

    let summary = transform_dataset(&mut session, &people_spec(), &TransformOptions::default()).unwrap();

    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.inserted, 0);
    assert_eq!(destination(&session), vec![(5, "Original".to_string(), None)]);
}

#[test]
fn test_ensure_index_twice_is_noop() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut session = open(&dir);
    let bare = DatasetSpec {
        indexes: Vec::new(),
        ..people_spec()
    };
    ensure_table(&mut session, &bare, false, None).unwrap();

    let index = IndexSpec::new("IX_people_typed_person_id", ["person_id"]).unique();
    assert_eq!(
        ensure_index(&mut session, "main.people_typed", &index).unwrap(),
        IndexOutcome::Created
    );
    assert_eq!(
        ensure_index(&mut session, "main.people_typed", &index).unwrap(),
        IndexOutcome::Skipped
    );

    let count: i64 = session
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'IX_people_typed_person_id'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_rejecting_same_input_twice_gives_same_digest() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut session = open(&dir);
    stage(&session, &[(Some("x"), None, Some("nan"))]);
    ensure_table(&mut session, &people_spec(), false, None).unwrap();

    transform_dataset(&mut session, &people_spec(), &TransformOptions::default()).unwrap();
    transform_dataset(&mut session, &people_spec(), &TransformOptions::default()).unwrap();

    let rejects = list_rejects(&session, "people", None).unwrap();
    assert_eq!(rejects.len(), 2);
    assert_eq!(rejects[0].row_hash, rejects[1].row_hash);
    assert_eq!(rejects[0].reject_reasons, "required:person_id|required:full_name");
}

#[test]
fn test_incremental_twice_is_idempotent() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut session = open(&dir);
    stage(
        &session,
        &[
            (Some("1"), Some("Ann"), Some("01/02/2020")),
            (Some("2"), Some("Bob"), Some("2020-02-03T10:00:00Z")),
            (Some("2"), Some("Bobby"), None),
        ],
    );
    ensure_table(&mut session, &people_spec(), false, None).unwrap();
    let options = TransformOptions::default().batch_size(2);

    let first = transform_dataset(&mut session, &people_spec(), &options).unwrap();
    let after_first = destination(&session);
    let second = transform_dataset(&mut session, &people_spec(), &options).unwrap();

    assert_eq!(first.inserted, 2);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.accepted, 3);
    assert_eq!(destination(&session), after_first);
    assert_eq!(
        after_first,
        vec![
            (1, "Ann".to_string(), Some("2020-01-02".to_string())),
            (2, "Bob".to_string(), Some("2020-02-03".to_string())),
        ]
    );
}

#[test]
fn test_full_reload_clears_existing_rows() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut session = open(&dir);
    ensure_table(&mut session, &people_spec(), false, None).unwrap();
    session
        .conn()
        .execute("INSERT INTO people_typed (person_id, full_name) VALUES (99, 'Stale')", [])
        .unwrap();
    stage(&session, &[(Some("1"), Some("Fresh"), None)]);

    let options = TransformOptions::default().policy(PromotionPolicy::FullReload);
    let summary = transform_dataset(&mut session, &people_spec(), &options).unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(destination(&session), vec![(1, "Fresh".to_string(), None)]);
}

#[test]
fn test_missing_required_always_reported() {
    let spec = people_spec()
        .range(datagate::RangeRule::new("person_id", Some(10.0), None))
        .cross(datagate::CrossRule::new("never", |_| Ok(false)));
    let raw = RawRow::new().with("person_id", Some("3")).with("full_name", None);

    let reasons: Vec<String> = validate(&raw, &spec).reasons.iter().map(ToString::to_string).collect();
    assert_eq!(reasons, vec!["required:full_name", "range_min:person_id", "cross:never"]);
}

#[test]
fn test_drop_create_round_trip_through_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    {
        let mut session = open(&dir);
        let report = ensure_table(&mut session, &people_spec(), false, None).unwrap();
        assert_eq!(report.outcome, TableOutcome::Created);
    }

    let mut session = open(&dir);
    let table = QualifiedName::parse("main.people_typed").unwrap();
    assert!(session.table_exists(&table).unwrap());

    let report = ensure_table(
        &mut session,
        &people_spec(),
        true,
        Some("DROP_CREATE main.people_typed"),
    )
    .unwrap();
    assert_eq!(report.outcome, TableOutcome::Recreated);
}

// =============================================================================
// Store failures
// =============================================================================

#[test]
fn test_store_error_aborts_and_keeps_committed_batches() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut session = open(&dir);
    ensure_table(&mut session, &people_spec(), false, None).unwrap();
    session
        .conn()
        .execute("INSERT INTO people_typed (person_id, full_name) VALUES (99, 'Stale')", [])
        .unwrap();
    stage(
        &session,
        &[
            (Some("1"), Some("Ann"), None),
            (Some("2"), Some("Bob"), None),
            (Some("3"), Some("Cy"), None),
            (Some("3"), Some("Cy again"), None),
            (Some("4"), Some("Di"), None),
        ],
    );

    let options = TransformOptions::default()
        .policy(PromotionPolicy::FullReload)
        .batch_size(2);
    let err = transform_dataset(&mut session, &people_spec(), &options).unwrap_err();

    assert!(!err.is_configuration());
    assert_eq!(
        destination(&session),
        vec![(1, "Ann".to_string(), None), (2, "Bob".to_string(), None)]
    );
}
