use notebooks_core::db::open_db;
use notebooks_core::{
    prompt_channel, spawn_import, ConflictChoice, ConflictDecision, ConflictPrompt, FailureCause,
    ImportError, ImportJob, ImportOptions, ImportStatus, NoopProgress, Notebook, ReadOnlyMode, RecordRepository,
    SqliteRecordRepository,
};
use std::path::Path;

const DOCUMENT: &str = r#"{"version":1,"notebooks":[
    {"notebook":{"title":"Work"},"chapters":[{"chapter":{"title":"Q1"},"notes":[{"title":"Plan","updateTime":5}]}]},
    {"notebook":{"title":"Home"},"chapters":[]}
]}"#;

fn seed(db_path: &Path, titles: &[&str]) {
    let conn = open_db(db_path).unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    for title in titles {
        repo.insert_notebook(&Notebook::new(*title, 1)).unwrap();
    }
}

fn titles(db_path: &Path) -> Vec<String> {
    let conn = open_db(db_path).unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    repo.list_notebooks()
        .unwrap()
        .into_iter()
        .map(|notebook| notebook.title)
        .collect()
}

#[test]
fn background_import_asks_interactive_side_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("store.db");
    let import_path = dir.path().join("export.json");
    std::fs::write(&import_path, DOCUMENT).unwrap();
    seed(&db_path, &["Work"]);

    let read_only = ReadOnlyMode::new();
    let (decisions, responder) = prompt_channel();
    let handle = spawn_import(
        ImportJob {
            db_path: db_path.clone(),
            import_path,
            options: ImportOptions::default(),
        },
        read_only.clone(),
        decisions,
        NoopProgress,
    )
    .unwrap();

    let mut asked = Vec::new();
    responder.serve(|prompt| {
        asked.push(prompt.title.clone());
        ConflictDecision::once(ConflictChoice::Update)
    });
    let report = handle.join().unwrap();

    assert_eq!(asked, ["Work"]);
    assert_eq!(report.status, ImportStatus::Completed);
    assert_eq!(report.processed, 2);
    assert!(!read_only.is_active());
    assert_eq!(titles(&db_path), ["Work", "Home"]);
}

#[test]
fn dropped_responder_cancels_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("store.db");
    let import_path = dir.path().join("export.json");
    std::fs::write(&import_path, DOCUMENT).unwrap();
    seed(&db_path, &["Work"]);

    let (decisions, responder) = prompt_channel();
    drop(responder);
    let report = spawn_import(
        ImportJob {
            db_path: db_path.clone(),
            import_path,
            options: ImportOptions::default(),
        },
        ReadOnlyMode::new(),
        decisions,
        NoopProgress,
    )
    .unwrap()
    .join()
    .unwrap();

    assert_eq!(report.status, ImportStatus::CancelledByDecision);
    assert_eq!(report.processed, 0);
    assert_eq!(titles(&db_path), ["Work"]);
}

#[test]
fn cancelled_handle_reports_signal() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("store.db");
    let import_path = dir.path().join("export.json");
    std::fs::write(&import_path, DOCUMENT).unwrap();
    seed(&db_path, &["Work"]);

    let (decisions, responder) = prompt_channel();
    let handle = spawn_import(
        ImportJob {
            db_path: db_path.clone(),
            import_path,
            options: ImportOptions::default(),
        },
        ReadOnlyMode::new(),
        decisions,
        NoopProgress,
    )
    .unwrap();

    // The worker blocks on the "Work" conflict until we answer, so the
    // cancellation is observed before "Home" is touched.
    let pending = responder.next_prompt().unwrap();
    handle.cancel();
    pending.answer(ConflictDecision::once(ConflictChoice::Skip));
    drop(responder);
    let report = handle.join().unwrap();

    assert_eq!(report.status, ImportStatus::CancelledBySignal);
    assert_eq!(report.processed, 1);
    assert_eq!(titles(&db_path), ["Work"]);
}

#[test]
fn worker_panic_reports_notebooks_resolved_before_it() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("store.db");
    let import_path = dir.path().join("export.json");
    std::fs::write(
        &import_path,
        r#"{"version":1,"notebooks":[
            {"notebook":{"title":"Home"},"chapters":[]},
            {"notebook":{"title":"Work"},"chapters":[]}
        ]}"#,
    )
    .unwrap();
    seed(&db_path, &["Work"]);

    let read_only = ReadOnlyMode::new();
    let decide = |_prompt: &ConflictPrompt| -> ConflictDecision {
        panic!("decision source crashed");
    };
    let err = spawn_import(
        ImportJob {
            db_path: db_path.clone(),
            import_path,
            options: ImportOptions::default(),
        },
        read_only.clone(),
        decide,
        NoopProgress,
    )
    .unwrap()
    .join()
    .unwrap_err();

    match err {
        ImportError::Unexpected {
            committed,
            cause: FailureCause::WorkerPanicked(message),
        } => {
            assert_eq!(committed, 1);
            assert!(message.contains("decision source crashed"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!read_only.is_active());
    assert_eq!(titles(&db_path), ["Work", "Home"]);
}
