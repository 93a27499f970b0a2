//! Tutor Store - persistence layer for the tutorial submission server
//!
//! Keeps each student's draft answers, an append-only record of formal
//! submissions, administrative late allowances and the account table, and
//! derives per-exercise completion status from them.
//!
//! Callers (the CGI layer, admin tools) pass in a user name that has already
//! been authenticated. Package, problem set and exercise names come from the
//! client and are sanitized before they reach the filesystem.
//!
//! ## Storage Layout
//!
//! ```text
//! <base_dir>/
//! ├── version                          # server version marker
//! ├── public/exercises.zip             # published exercise package
//! └── data/
//!     ├── user_info                    # id,name,email,enrolled|not_enrolled
//!     ├── answers/<user>/<package>/<problem_set>/<exercise>
//!     └── submissions/
//!         ├── tutorial_hashes          # active exercises
//!         ├── tutorial_hash_mappings   # superseded hash -> replacement
//!         └── <user>/
//!             ├── submission_log
//!             ├── admin_log
//!             └── <identity_hash>      # submitted code
//! ```
//!
//! ## Concurrency
//!
//! All operations are synchronous file I/O. Writes for one user are
//! serialized inside a process; nothing coordinates separate processes
//! writing the same files.

pub mod answer_store;
pub mod catalog;
pub mod config;
pub mod digest;
pub mod error;
pub mod locks;
pub mod log;
pub mod package;
pub mod sanitize;
pub mod status;
pub mod submissions;
pub mod users;

// Re-exports
pub use answer_store::{AnswerKey, AnswerStore};
pub use catalog::{Catalog, ExerciseIdentity, HashChain};
pub use config::{Config, LogBackendKind};
pub use error::{FaultKind, StoreError};
pub use status::{Status, StatusEngine};
pub use submissions::{SubmissionEvent, SubmissionRecord, SubmissionStore};
pub use users::{Account, AccountOrdering, EnrollmentState, UserDirectory};

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::locks::UserLocks;
use crate::log::{FileLogBackend, LogBackend, SledLogBackend};

/// All stores opened from one [`Config`]
pub struct Storage {
    config: Config,
    answers: AnswerStore,
    submissions: SubmissionStore,
    users: UserDirectory,
}

impl Storage {
    pub fn open(config: Config) -> Result<Self, StoreError> {
        let locks = Arc::new(UserLocks::new());

        let backend: Arc<dyn LogBackend> = match config.log_backend {
            LogBackendKind::File => Arc::new(FileLogBackend::new(config.submissions_dir())),
            LogBackendKind::Sled => Arc::new(SledLogBackend::open(config.log_db_path())?),
        };

        let answers = AnswerStore::new(config.answers_dir(), Arc::clone(&locks))?;
        let submissions =
            SubmissionStore::new(config.submissions_dir(), backend, Arc::clone(&locks))?;
        let users = UserDirectory::new(config.user_info_path(), locks);

        info!(
            base_dir = %config.base_dir.display(),
            log_backend = ?config.log_backend,
            "Opened storage"
        );

        Ok(Self {
            config,
            answers,
            submissions,
            users,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn answers(&self) -> &AnswerStore {
        &self.answers
    }

    pub fn submissions(&self) -> &SubmissionStore {
        &self.submissions
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    /// Read the catalog and hash mappings from disk.
    pub fn load_catalog(&self) -> Result<Catalog, StoreError> {
        Catalog::load(self.config.catalog_path(), self.config.hash_mappings_path())
    }

    /// Status of every active exercise for `user` against the current catalog.
    pub fn compute_statuses(&self, user: &str) -> Result<BTreeMap<String, Status>, StoreError> {
        let catalog = self.load_catalog()?;
        StatusEngine::new(&catalog, &self.submissions).compute_statuses(user)
    }

    pub fn version(&self) -> Result<String, StoreError> {
        package::read_version(self.config.version_path())
    }

    pub fn package_timestamp(&self) -> Result<String, StoreError> {
        package::read_package_timestamp(
            self.config.package_archive_path(),
            &self.config.package_metadata_entry,
        )
    }
}
