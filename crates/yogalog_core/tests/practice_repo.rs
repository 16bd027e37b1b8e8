use chrono::{TimeZone, Utc};
use yogalog_core::db::open_db_in_memory;
use yogalog_core::{
    AsanaEntry, AsanaStatus, NewPracticeLog, PhotoReference, PracticeLogRepository,
    PracticeLogValidationError, RepoError, SqlitePracticeLogRepository,
};

fn morning_flow() -> NewPracticeLog {
    let mut fields = NewPracticeLog::new(
        "Morning Flow",
        Utc.with_ymd_and_hms(2026, 1, 15, 7, 0, 0).unwrap(),
    );
    fields.duration_minutes = 75;
    fields.intensity = 4;
    fields.note = "Felt open in the hips.".to_string();
    fields.location = Some("Home studio".to_string());
    fields
}

#[test]
fn try_new_rejects_unmigrated_connection() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    let err = SqlitePracticeLogRepository::try_new(&conn)
        .err()
        .expect("missing schema must be rejected");
    assert!(matches!(err, RepoError::MissingRequiredTable("practice_logs")));
}

#[test]
fn create_and_list_round_trips_fields_and_children() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqlitePracticeLogRepository::try_new(&conn).unwrap();

    let id = repo.create_record(&morning_flow()).unwrap();
    repo.create_asana_entry(
        id,
        &AsanaEntry::new("Child's Pose", 1).with_note("long exhale"),
    )
    .unwrap();
    repo.create_asana_entry(
        id,
        &AsanaEntry::new("Downward Dog", 0).with_status(AsanaStatus::Mastered),
    )
    .unwrap();
    repo.create_photo_entry(id, &PhotoReference::new("/photos/a.jpg", 0))
        .unwrap();

    let logs = repo.list_all_records().unwrap();
    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert_eq!(log.id, id);
    assert_eq!(log.title, "Morning Flow");
    assert_eq!(log.duration_minutes, 75);
    assert_eq!(log.intensity, 4);
    assert_eq!(log.location.as_deref(), Some("Home studio"));

    let asanas = repo.list_asanas(id).unwrap();
    let names = asanas.iter().map(|a| a.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["Downward Dog", "Child's Pose"]);
    assert_eq!(asanas[0].status, Some(AsanaStatus::Mastered));
    assert_eq!(asanas[1].note.as_deref(), Some("long exhale"));

    let photos = repo.list_photos(id).unwrap();
    assert_eq!(photos, vec![PhotoReference::new("/photos/a.jpg", 0)]);
}

#[test]
fn list_all_records_orders_newest_first() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqlitePracticeLogRepository::try_new(&conn).unwrap();

    for day in [3, 1, 2] {
        let fields =
            NewPracticeLog::new("Flow", Utc.with_ymd_and_hms(2026, 2, day, 8, 0, 0).unwrap());
        repo.create_record(&fields).unwrap();
    }

    let days = repo
        .list_all_records()
        .unwrap()
        .iter()
        .map(|log| log.day_prefix())
        .collect::<Vec<_>>();
    assert_eq!(days, ["2026-02-03", "2026-02-02", "2026-02-01"]);
}

#[test]
fn create_record_validates_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqlitePracticeLogRepository::try_new(&conn).unwrap();

    let mut blank = morning_flow();
    blank.title = "   ".to_string();
    assert!(matches!(
        repo.create_record(&blank),
        Err(RepoError::Validation(PracticeLogValidationError::EmptyTitle))
    ));

    let mut too_hard = morning_flow();
    too_hard.intensity = 6;
    assert!(matches!(
        repo.create_record(&too_hard),
        Err(RepoError::Validation(
            PracticeLogValidationError::IntensityOutOfRange(6)
        ))
    ));
    assert_eq!(repo.count_records().unwrap(), 0);
}

#[test]
fn child_entries_require_existing_record() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqlitePracticeLogRepository::try_new(&conn).unwrap();
    let missing = uuid::Uuid::new_v4();

    assert!(matches!(
        repo.create_asana_entry(missing, &AsanaEntry::new("Tree", 0)),
        Err(RepoError::NotFound(id)) if id == missing
    ));
    assert!(matches!(
        repo.create_photo_entry(missing, &PhotoReference::new("/p.jpg", 0)),
        Err(RepoError::NotFound(id)) if id == missing
    ));
}

#[test]
fn duplicate_key_matches_same_title_on_same_day_only() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqlitePracticeLogRepository::try_new(&conn).unwrap();
    let id = repo.create_record(&morning_flow()).unwrap();

    let found = repo
        .find_by_duplicate_key("Morning Flow", "2026-01-15")
        .unwrap()
        .expect("same title and day must match");
    assert_eq!(found.id, id);

    assert!(repo
        .find_by_duplicate_key("Morning Flow", "2026-01-16")
        .unwrap()
        .is_none());
    assert!(repo
        .find_by_duplicate_key("morning flow", "2026-01-15")
        .unwrap()
        .is_none());
}

#[test]
fn failed_transaction_discards_all_writes() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqlitePracticeLogRepository::try_new(&conn).unwrap();

    let outcome: Result<(), RepoError> = repo.run_in_transaction(|repo| {
        repo.create_record(&morning_flow())?;
        Err(RepoError::InvalidData("stop".to_string()))
    });
    assert!(outcome.is_err());
    assert_eq!(repo.count_records().unwrap(), 0);
}

#[test]
fn isolated_scope_rolls_back_alone_inside_transaction() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqlitePracticeLogRepository::try_new(&conn).unwrap();

    let kept = repo
        .run_in_transaction(|repo| -> Result<_, RepoError> {
            let kept = repo.run_isolated(|repo| repo.create_record(&morning_flow()))?;
            let failed: Result<(), RepoError> = repo.run_isolated(|repo| {
                let mut other = morning_flow();
                other.title = "Evening Flow".to_string();
                let id = repo.create_record(&other)?;
                repo.create_asana_entry(id, &AsanaEntry::new("  ", 0))
            });
            assert!(failed.is_err());
            Ok(kept)
        })
        .unwrap();

    let logs = repo.list_all_records().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, kept);
    assert!(repo.get_record(kept).unwrap().is_some());
}
