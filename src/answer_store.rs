//! Draft answer storage
//!
//! One text file per (user, package, problem set, exercise) under
//! `answers/<user>/<package>/<problem_set>/<exercise>`. The package, problem
//! set and exercise names are sanitized before use; the user name is taken
//! as already authenticated and used as-is.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

use crate::digest::content_hash;
use crate::error::StoreError;
use crate::locks::UserLocks;
use crate::sanitize::secure_segment;

/// Addresses one draft answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerKey<'a> {
    pub user: &'a str,
    pub package: &'a str,
    pub problem_set: &'a str,
    pub exercise: &'a str,
}

impl<'a> AnswerKey<'a> {
    pub fn new(user: &'a str, package: &'a str, problem_set: &'a str, exercise: &'a str) -> Self {
        Self {
            user,
            package,
            problem_set,
            exercise,
        }
    }
}

fn segment(kind: &str, name: &str) -> Result<String, StoreError> {
    let safe = secure_segment(name);
    if safe.is_empty() {
        return Err(StoreError::InvalidName(format!(
            "{} name {:?} has no usable characters",
            kind, name
        )));
    }
    Ok(safe)
}

/// Draft answer store
pub struct AnswerStore {
    /// Root directory for answers
    root_dir: PathBuf,
    locks: Arc<UserLocks>,
}

impl AnswerStore {
    /// Create a new answer store at the given directory
    pub fn new<P: AsRef<Path>>(root_dir: P, locks: Arc<UserLocks>) -> Result<Self, StoreError> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir)?;

        info!(path = %root_dir.display(), "Initialized answer store");

        Ok(Self { root_dir, locks })
    }

    fn problem_set_dir(&self, key: &AnswerKey<'_>) -> Result<PathBuf, StoreError> {
        if key.user.is_empty() {
            return Err(StoreError::InvalidName("empty user name".to_string()));
        }
        Ok(self
            .root_dir
            .join(key.user)
            .join(segment("package", key.package)?)
            .join(segment("problem set", key.problem_set)?))
    }

    /// Path of the draft file (which may not exist)
    pub fn answer_path(&self, key: &AnswerKey<'_>) -> Result<PathBuf, StoreError> {
        Ok(self
            .problem_set_dir(key)?
            .join(segment("exercise", key.exercise)?))
    }

    /// Create the problem set directory for `key` if missing.
    pub fn ensure_problem_set_dir(&self, key: &AnswerKey<'_>) -> Result<PathBuf, StoreError> {
        let dir = self.problem_set_dir(key)?;
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Stored draft text, or `None` if nothing was written yet.
    ///
    /// Creates the problem set directory so the user's tree mirrors what
    /// they have opened locally.
    pub fn read(&self, key: &AnswerKey<'_>) -> Result<Option<String>, StoreError> {
        self.ensure_problem_set_dir(key)?;
        let path = self.answer_path(key)?;

        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(user = %key.user, path = %path.display(), "Read draft");
                Ok(Some(text))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the stored draft with `text`.
    ///
    /// The text goes to a temporary sibling first and is renamed over the
    /// draft, so an interrupted write leaves the previous draft intact.
    pub fn write(&self, key: &AnswerKey<'_>, text: &str) -> Result<(), StoreError> {
        let dir = self.ensure_problem_set_dir(key)?;
        let path = self.answer_path(key)?;
        // sanitized names never start with '.', so this cannot clash with a draft
        let tmp = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

        self.locks.with_user(key.user, || -> Result<(), StoreError> {
            fs::write(&tmp, text.as_bytes())?;
            if let Err(e) = fs::rename(&tmp, &path) {
                fs::remove_file(&tmp).ok();
                return Err(e.into());
            }
            Ok(())
        })?;

        info!(user = %key.user, path = %path.display(), size = text.len(), "Stored draft");
        Ok(())
    }

    /// Base32 SHA-512 of the stored draft
    pub fn hash(&self, key: &AnswerKey<'_>) -> Result<Option<String>, StoreError> {
        Ok(self
            .read(key)?
            .map(|text| content_hash(text.as_bytes())))
    }

    /// Last write time of the stored draft
    pub fn modified_at(&self, key: &AnswerKey<'_>) -> Result<Option<SystemTime>, StoreError> {
        self.ensure_problem_set_dir(key)?;
        let path = self.answer_path(key)?;

        match fs::metadata(&path) {
            Ok(metadata) => Ok(Some(metadata.modified()?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
