//! End-to-end tests through the `Storage` facade
//!
//! Each test builds a throwaway base directory with a catalog and hash
//! mappings, then drives drafts, submissions and statuses the way the
//! request layer would.

use chrono::{Local, NaiveDate, NaiveDateTime};
use std::fs;
use tempfile::TempDir;
use tutor_store::digest::{content_hash, strip_padding, HASH_TOKEN_LEN};
use tutor_store::{
    Account, AnswerKey, Config, EnrollmentState, LogBackendKind, Status, Storage, StoreError,
};

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// Storage with two active exercises; `old` forwards to the first
fn open_storage(backend: LogBackendKind) -> (Storage, TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::with_base_dir(temp_dir.path());
    config.log_backend = backend;

    let current = content_hash(b"Introduction/Using Functions rev 2");
    let old = content_hash(b"Introduction/Using Functions rev 1");
    let other = content_hash(b"Loops/While Loops");

    fs::create_dir_all(config.submissions_dir()).unwrap();
    fs::write(
        config.catalog_path(),
        format!(
            "{} 23_01/05/24 CSSE1001Tutorials Introduction Using_Functions\n\
             {} 23_08/05/24 CSSE1001Tutorials Loops While_Loops\n",
            current, other
        ),
    )
    .unwrap();
    fs::write(
        config.hash_mappings_path(),
        format!("{{\"{}\": \"{}\"}}", old, current),
    )
    .unwrap();

    let storage = Storage::open(config).unwrap();
    (storage, temp_dir, current, old)
}

#[test]
fn test_submit_and_read_back() {
    let (storage, temp, current, _old) = open_storage(LogBackendKind::File);
    assert_eq!(current.len(), HASH_TOKEN_LEN);

    let code = "def square(x):\n    return x * x\n";
    let before = Local::now().naive_local();
    let event = storage
        .submissions()
        .append_submission("s1", &current, code)
        .unwrap();
    let after = Local::now().naive_local();

    let events = storage.submissions().read_submissions("s1").unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].identity_hash, current);
    assert_eq!(events[0], event);
    assert!(event.submitted_at >= before - chrono::Duration::milliseconds(1));
    assert!(event.submitted_at <= after);

    let snapshot = temp
        .path()
        .join("data/submissions/s1")
        .join(strip_padding(&current));
    assert_eq!(fs::read_to_string(snapshot).unwrap(), code);
}

#[test]
fn test_draft_is_independent_of_submission() {
    let (storage, _temp, current, _old) = open_storage(LogBackendKind::File);
    let key = AnswerKey::new("s1", "CSSE1001Tutorials", "Introduction", "Using Functions");

    storage.answers().write(&key, "first draft").unwrap();
    let draft = storage.answers().read(&key).unwrap().unwrap();
    storage
        .submissions()
        .append_submission("s1", &current, &draft)
        .unwrap();

    storage.answers().write(&key, "second draft").unwrap();

    assert_eq!(
        storage.submissions().read_snapshot("s1", &current).unwrap().as_deref(),
        Some("first draft")
    );
    assert_eq!(
        storage.answers().hash(&key).unwrap(),
        Some(content_hash(b"second draft"))
    );
}

#[test]
fn test_statuses_across_renames() {
    let (storage, _temp, current, old) = open_storage(LogBackendKind::File);
    let submissions = storage.submissions();

    let statuses = storage.compute_statuses("s1").unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.values().all(|status| *status == Status::Missing));

    // a stale client submits on time under the old hash
    submissions.append_submission_at("s1", &old, "x", at(1, 22)).unwrap();
    let statuses = storage.compute_statuses("s1").unwrap();
    assert_eq!(statuses[&current], Status::Ok);
    assert!(!statuses.contains_key(&old));

    submissions.append_submission_at("s2", &current, "x", at(2, 0)).unwrap();
    assert_eq!(storage.compute_statuses("s2").unwrap()[&current], Status::Late);

    submissions.grant_late_allowance("s2", &current).unwrap();
    assert_eq!(storage.compute_statuses("s2").unwrap()[&current], Status::LateOk);
}

#[test]
fn test_unknown_submission_hash_is_integrity_fault() {
    let (storage, _temp, _current, _old) = open_storage(LogBackendKind::File);
    let withdrawn = content_hash(b"never published");

    storage
        .submissions()
        .append_submission_at("s1", &withdrawn, "x", at(1, 1))
        .unwrap();

    let err = storage.compute_statuses("s1").unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));
    assert_eq!(err.kind(), tutor_store::FaultKind::Integrity);
}

#[test]
fn test_sled_logs_match_file_logs() {
    let (storage, temp, current, _old) = open_storage(LogBackendKind::Sled);

    storage
        .submissions()
        .append_submission_at("s1", &current, "x", at(2, 3))
        .unwrap();
    storage.submissions().grant_late_allowance("s1", &current).unwrap();

    assert_eq!(storage.compute_statuses("s1").unwrap()[&current], Status::LateOk);
    assert!(temp.path().join("data/logs.sled").exists());
    assert!(!temp.path().join("data/submissions/s1/submission_log").exists());
}

#[test]
fn test_account_directory() {
    let (storage, temp, _current, _old) = open_storage(LogBackendKind::File);
    let users = storage.users();

    let account = Account::new("a1", "Ada Lovelace", "ada@example.edu", EnrollmentState::Enrolled);
    assert!(users.add(&account).unwrap());
    assert!(!users.add(&account).unwrap());

    assert_eq!(users.find("a1").unwrap(), Some(account));
    assert_eq!(users.search("LOVELACE", None, None).unwrap().len(), 1);

    let table = fs::read_to_string(temp.path().join("data/user_info")).unwrap();
    assert_eq!(table.matches("a1,").count(), 1);
}

#[test]
fn test_missing_catalog_is_environment_error() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::open(Config::with_base_dir(temp_dir.path())).unwrap();

    let err = storage.compute_statuses("s1").unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
    assert!(storage.version().is_err());
}

#[test]
fn test_version_marker() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::with_base_dir(temp_dir.path());
    fs::write(config.version_path(), "3.1.0\n").unwrap();

    let storage = Storage::open(config).unwrap();
    assert_eq!(storage.version().unwrap(), "3.1.0");
}
