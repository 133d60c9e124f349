//! Integration tests for the ledger store

use atelier_core::{CeremonySession, CeremonyStatus, Priority, Task, TaskStatus};
use atelier_ledger::{ledger_filename, load_ledger, render, write_ledger};
use tempfile::TempDir;

fn sample_session(ledger_path: std::path::PathBuf) -> CeremonySession {
    let tasks = vec![
        Task::new("dye", "Dye the thread")
            .with_description("Madder root for the reds.")
            .with_priority(Priority::High),
        Task::new("warp", "Warp the loom").with_dependencies(vec!["dye".to_string()]),
    ];
    CeremonySession::new("Winter cloak", "ilse", "A cloak for the solstice.", tasks, ledger_path)
}

#[tokio::test]
async fn test_write_then_load_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ceremonies").join(ledger_filename("cer-test0001"));

    let mut session = sample_session(path.clone());
    session.status = CeremonyStatus::InProgress;

    write_ledger(&session).await.unwrap();

    let loaded = load_ledger(&path).await.expect("ledger should load");
    assert_eq!(loaded.ceremony_id, session.ceremony_id);
    assert_eq!(loaded.name, session.name);
    assert_eq!(loaded.initiator, session.initiator);
    assert_eq!(loaded.intention, session.intention);
    assert_eq!(loaded.status, CeremonyStatus::InProgress);
    assert_eq!(loaded.created_at, session.created_at);
    assert_eq!(loaded.tasks.len(), 2);
    assert_eq!(loaded.tasks[0].task_id, "dye");
    assert_eq!(loaded.tasks[1].dependencies, vec!["dye".to_string()]);
}

#[tokio::test]
async fn test_write_leaves_no_temp_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(ledger_filename("cer-test0002"));

    let session = sample_session(path.clone());
    write_ledger(&session).await.unwrap();

    assert!(path.exists());
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    assert!(!std::path::PathBuf::from(tmp).exists());
}

#[tokio::test]
async fn test_rewrite_is_byte_identical_for_same_state() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(ledger_filename("cer-test0003"));

    let session = sample_session(path.clone());
    write_ledger(&session).await.unwrap();
    let first = tokio::fs::read_to_string(&path).await.unwrap();

    write_ledger(&session).await.unwrap();
    let second = tokio::fs::read_to_string(&path).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, render(&session));
}

#[tokio::test]
async fn test_load_missing_file_returns_none() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nope.md");
    assert!(load_ledger(&path).await.is_none());
}

#[tokio::test]
async fn test_load_corrupted_file_returns_none() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("garbage.md");
    tokio::fs::write(&path, "completely unrelated text\nwith several\nlines")
        .await
        .unwrap();

    assert!(load_ledger(&path).await.is_none());
}

#[tokio::test]
async fn test_load_preserves_task_state() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(ledger_filename("cer-test0004"));

    let mut session = sample_session(path.clone());
    {
        let task = session.task_mut("dye").unwrap();
        task.status = TaskStatus::Failed;
        task.error = Some("The dye bath went cold.".to_string());
        task.completed_at = Some(chrono::Utc::now());
    }
    write_ledger(&session).await.unwrap();

    let loaded = load_ledger(&path).await.unwrap();
    let dye = loaded.task("dye").unwrap();
    assert_eq!(dye.status, TaskStatus::Failed);
    assert_eq!(dye.error.as_deref(), Some("The dye bath went cold."));
    assert!(dye.completed_at.is_some());
}
