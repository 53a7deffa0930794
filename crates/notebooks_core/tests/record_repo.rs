use notebooks_core::db::open_db_in_memory;
use notebooks_core::{
    Chapter, Note, Notebook, RecordKind, RecordRepository, RecordValidationError, RepoError,
    SqliteRecordRepository,
};
use rusqlite::Connection;

fn seed_chapter(repo: &SqliteRecordRepository<'_>, notebook: &str, chapter: &str) -> Chapter {
    let notebook = repo.insert_notebook(&Notebook::new(notebook, 1)).unwrap();
    let mut draft = Chapter::new(chapter, 1);
    draft.notebook_id = notebook.id;
    repo.insert_chapter(&draft).unwrap()
}

fn note_in(chapter: &Chapter, title: &str, update_time: i64) -> Note {
    let mut note = Note::new(title, update_time);
    note.notebook_id = chapter.notebook_id;
    note.chapter_id = chapter.id;
    note
}

#[test]
fn insert_assigns_ids_and_find_by_title_round_trips() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let notebook = repo.insert_notebook(&Notebook::new("Work", 10)).unwrap();
    assert!(notebook.id.is_some());

    let found = repo.find_notebook_by_title("Work").unwrap().unwrap();
    assert_eq!(found, notebook);
    assert!(repo.find_notebook_by_title("work").unwrap().is_none());
}

#[test]
fn chapter_lookup_is_scoped_to_notebook() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let q1 = seed_chapter(&repo, "Work", "Q1");
    let other = repo.insert_notebook(&Notebook::new("Home", 1)).unwrap();

    let work_id = q1.notebook_id.unwrap();
    assert_eq!(
        repo.find_chapter_by_title(work_id, "Q1").unwrap().unwrap().id,
        q1.id
    );
    assert!(repo
        .find_chapter_by_title(other.id.unwrap(), "Q1")
        .unwrap()
        .is_none());
}

#[test]
fn insert_and_update_notes_in_batches() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let chapter = seed_chapter(&repo, "Work", "Q1");
    let chapter_id = chapter.id.unwrap();

    repo.insert_notes(&[note_in(&chapter, "Plan", 100), note_in(&chapter, "Backlog", 100)])
        .unwrap();
    let listed = repo.list_notes(chapter_id).unwrap();
    assert_eq!(listed.len(), 2);

    let mut plan = repo.find_note_by_title(chapter_id, "Plan").unwrap().unwrap();
    plan.content = Some("v2".to_string());
    plan.update_time = 150;
    repo.update_notes(&[plan]).unwrap();

    let reloaded = repo.find_note_by_title(chapter_id, "Plan").unwrap().unwrap();
    assert_eq!(reloaded.content.as_deref(), Some("v2"));
    assert_eq!(reloaded.update_time, 150);
}

#[test]
fn note_batch_is_all_or_nothing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let chapter = seed_chapter(&repo, "Work", "Q1");

    let mut orphan = note_in(&chapter, "Orphan", 2);
    orphan.chapter_id = Some(9_999);
    let err = repo
        .insert_notes(&[note_in(&chapter, "Plan", 1), orphan])
        .unwrap_err();
    assert!(matches!(err, RepoError::Db(_)), "unexpected error: {err}");
    assert!(repo.list_notes(chapter.id.unwrap()).unwrap().is_empty());
}

#[test]
fn missing_parent_is_a_constraint_violation() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let mut chapter = Chapter::new("Q1", 1);
    chapter.notebook_id = Some(9_999);
    let err = repo.insert_chapter(&chapter).unwrap_err();
    assert_eq!(err.code(), "db_constraint");
    match err {
        RepoError::Db(db_err) => assert!(db_err.is_constraint_violation()),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repeated_titles_are_stored_and_lookup_returns_the_first() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let chapter = seed_chapter(&repo, "Work", "Q1");
    let chapter_id = chapter.id.unwrap();

    let mut first = note_in(&chapter, "Plan", 1);
    first.content = Some("first".to_string());
    let mut second = note_in(&chapter, "Plan", 2);
    second.content = Some("second".to_string());
    repo.insert_notes(&[first, second]).unwrap();

    let listed = repo.list_notes(chapter_id).unwrap();
    assert_eq!(listed.len(), 2);
    let found = repo.find_note_by_title(chapter_id, "Plan").unwrap().unwrap();
    assert_eq!(found.content.as_deref(), Some("first"));
    assert_eq!(found.id, listed.iter().filter_map(|note| note.id).min());

    let mut twin = Chapter::new("Q1", 5);
    twin.notebook_id = chapter.notebook_id;
    repo.insert_chapter(&twin).unwrap();
    let notebook_id = chapter.notebook_id.unwrap();
    assert_eq!(repo.list_chapters(notebook_id).unwrap().len(), 2);
    assert_eq!(
        repo.find_chapter_by_title(notebook_id, "Q1").unwrap().unwrap().id,
        chapter.id
    );
}

#[test]
fn update_of_missing_note_reports_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let chapter = seed_chapter(&repo, "Work", "Q1");

    let mut ghost = note_in(&chapter, "Ghost", 1);
    ghost.id = Some(4242);
    match repo.update_notes(&[ghost]).unwrap_err() {
        RepoError::NotFound(RecordKind::Note, id) => assert_eq!(id, 4242),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn write_paths_validate_records() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    match repo.insert_notebook(&Notebook::new("   ", 1)).unwrap_err() {
        RepoError::Validation(RecordValidationError::BlankTitle(RecordKind::Notebook)) => {}
        other => panic!("unexpected error: {other}"),
    }
    match repo.insert_chapter(&Chapter::new("Orphan", 1)).unwrap_err() {
        RepoError::Validation(RecordValidationError::MissingParent { .. }) => {}
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn delete_notebook_cascade_removes_subtree_only() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let work = seed_chapter(&repo, "Work", "Q1");
    let home = seed_chapter(&repo, "Home", "Chores");
    repo.insert_notes(&[note_in(&work, "Plan", 1)]).unwrap();
    repo.insert_notes(&[note_in(&home, "Dishes", 1)]).unwrap();

    repo.delete_notebook_cascade(work.notebook_id.unwrap()).unwrap();

    assert!(repo.find_notebook_by_title("Work").unwrap().is_none());
    assert_eq!(count(&conn, "chapters"), 1);
    assert_eq!(count(&conn, "notes"), 1);
    assert!(matches!(
        repo.delete_notebook_cascade(work.notebook_id.unwrap()),
        Err(RepoError::NotFound(RecordKind::Notebook, _))
    ));
}

#[test]
fn rollback_unit_discards_all_writes_since_begin() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    repo.insert_notebook(&Notebook::new("Kept", 1)).unwrap();

    repo.begin_unit().unwrap();
    let chapter = seed_chapter(&repo, "Dropped", "Q1");
    repo.insert_notes(&[note_in(&chapter, "Plan", 1)]).unwrap();
    repo.rollback_unit().unwrap();

    repo.begin_unit().unwrap();
    repo.insert_notebook(&Notebook::new("Committed", 1)).unwrap();
    repo.commit_unit().unwrap();

    let titles: Vec<String> = repo
        .list_notebooks()
        .unwrap()
        .into_iter()
        .map(|notebook| notebook.title)
        .collect();
    assert_eq!(titles, vec!["Kept".to_string(), "Committed".to_string()]);
    assert_eq!(count(&conn, "notes"), 0);
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
        .unwrap()
}
