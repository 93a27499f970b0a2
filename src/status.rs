//! Completion status per exercise

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, error};

use crate::catalog::Catalog;
use crate::error::StoreError;
use crate::submissions::SubmissionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Missing,
    Ok,
    Late,
    LateOk,
}

impl Status {
    /// Outcome of one submission. Submitting exactly at the due time is on time.
    pub fn classify(submitted_at: NaiveDateTime, due_at: NaiveDateTime, allow_late: bool) -> Self {
        if submitted_at <= due_at {
            Status::Ok
        } else if allow_late {
            Status::LateOk
        } else {
            Status::Late
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Missing => "MISSING",
            Status::Ok => "OK",
            Status::Late => "LATE",
            Status::LateOk => "LATE_OK",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combines the catalog with a user's logs
pub struct StatusEngine<'a> {
    catalog: &'a Catalog,
    submissions: &'a SubmissionStore,
}

impl<'a> StatusEngine<'a> {
    pub fn new(catalog: &'a Catalog, submissions: &'a SubmissionStore) -> Self {
        Self {
            catalog,
            submissions,
        }
    }

    /// Status of every active exercise for `user`, keyed by current hash.
    ///
    /// Submissions are applied in log order and the last one for an exercise
    /// decides its status. A late allowance counts whether it was granted on
    /// the submitted hash or on the exercise's current hash. A submission
    /// whose hash no longer resolves is an integrity fault.
    pub fn compute_statuses(&self, user: &str) -> Result<BTreeMap<String, Status>, StoreError> {
        let mut statuses: BTreeMap<String, Status> = self
            .catalog
            .identities()
            .map(|identity| (identity.identity_hash.clone(), Status::Missing))
            .collect();

        let allowances = self.submissions.late_allowances(user)?;

        for event in self.submissions.read_submissions(user)? {
            let Some(identity) = self.catalog.resolve(&event.identity_hash)? else {
                error!(
                    user = %user,
                    hash = %event.identity_hash,
                    "Submission for an exercise missing from the catalog"
                );
                return Err(StoreError::Integrity(format!(
                    "submission by {} references unknown exercise {}",
                    user, event.identity_hash
                )));
            };

            let allow_late = allowances.contains(&event.identity_hash)
                || allowances.contains(&identity.identity_hash);
            let status = Status::classify(event.submitted_at, identity.due_at, allow_late);
            statuses.insert(identity.identity_hash.clone(), status);
        }

        debug!(user = %user, exercises = statuses.len(), "Computed statuses");
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{parse_catalog, HashChain};
    use crate::locks::UserLocks;
    use crate::log::FileLogBackend;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use tempfile::TempDir;

    const CATALOG: &str = "\
H 23_01/05/24 Pkg Intro Hello
G 23_08/05/24 Pkg Intro World
";

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn fixture() -> (Catalog, SubmissionStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("submissions");
        let store = SubmissionStore::new(
            &dir,
            Arc::new(FileLogBackend::new(&dir)),
            Arc::new(UserLocks::new()),
        )
        .unwrap();

        let mut chain = HashChain::new();
        chain.insert("HOLD", Some("H".to_string()));
        chain.insert("GONE", None);
        let catalog = Catalog::from_parts(parse_catalog(CATALOG, "tutorial_hashes").unwrap(), chain);

        (catalog, store, temp_dir)
    }

    #[test]
    fn test_classify() {
        let due = at(1, 23);
        assert_eq!(Status::classify(at(1, 22), due, false), Status::Ok);
        assert_eq!(Status::classify(due, due, false), Status::Ok);
        assert_eq!(Status::classify(at(2, 0), due, false), Status::Late);
        assert_eq!(Status::classify(at(2, 0), due, true), Status::LateOk);
        assert_eq!(Status::LateOk.to_string(), "LATE_OK");
    }

    #[test]
    fn test_missing_without_submissions() {
        let (catalog, store, _temp) = fixture();
        let statuses = StatusEngine::new(&catalog, &store).compute_statuses("s1").unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.values().all(|status| *status == Status::Missing));
    }

    #[test]
    fn test_on_time_late_and_allowed() {
        let (catalog, store, _temp) = fixture();
        let engine = StatusEngine::new(&catalog, &store);

        store.append_submission_at("ok", "H", "a", at(1, 22)).unwrap();
        assert_eq!(engine.compute_statuses("ok").unwrap()["H"], Status::Ok);

        store.append_submission_at("late", "H", "a", at(2, 0)).unwrap();
        assert_eq!(engine.compute_statuses("late").unwrap()["H"], Status::Late);

        store.grant_late_allowance("excused", "H").unwrap();
        store.append_submission_at("excused", "H", "a", at(2, 0)).unwrap();
        let statuses = engine.compute_statuses("excused").unwrap();
        assert_eq!(statuses["H"], Status::LateOk);
        assert_eq!(statuses["G"], Status::Missing);
    }

    #[test]
    fn test_stale_hash_counts_for_current_exercise() {
        let (catalog, store, _temp) = fixture();
        store.grant_late_allowance("s1", "H").unwrap();
        store.append_submission_at("s1", "HOLD", "a", at(3, 0)).unwrap();

        let statuses = StatusEngine::new(&catalog, &store).compute_statuses("s1").unwrap();
        assert!(!statuses.contains_key("HOLD"));
        assert_eq!(statuses["H"], Status::LateOk);
    }

    #[test]
    fn test_last_submission_wins() {
        let (catalog, store, _temp) = fixture();
        store.append_submission_at("s1", "H", "a", at(1, 10)).unwrap();
        store.append_submission_at("s1", "H", "b", at(5, 10)).unwrap();

        let statuses = StatusEngine::new(&catalog, &store).compute_statuses("s1").unwrap();
        assert_eq!(statuses["H"], Status::Late);
    }

    #[test]
    fn test_unknown_exercise_is_integrity_fault() {
        let (catalog, store, _temp) = fixture();
        store.append_submission_at("s1", "GONE", "a", at(1, 10)).unwrap();

        let err = StatusEngine::new(&catalog, &store)
            .compute_statuses("s1")
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }
}
