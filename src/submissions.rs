//! Submission and admin logs
//!
//! ## Layout
//!
//! ```text
//! submissions/<user>/
//! ├── submission_log     # "<identity_hash> <ISO-8601 local time>" per line
//! ├── admin_log          # "allow_late <identity_hash>" per line
//! └── <stripped_hash>    # code as submitted for that exercise
//! ```
//!
//! The logs go through a [`LogBackend`], so they can live in sled instead of
//! text files; code snapshots are always plain files.
//!
//! A submission is recorded as: check the identity hash is filesystem-safe,
//! write the snapshot, append the log line. A bad hash therefore leaves
//! nothing behind, and a crash between the two writes leaves at worst a
//! snapshot without a log entry (never a log entry without a snapshot).

use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::digest::{is_hash_token, strip_padding};
use crate::error::StoreError;
use crate::locks::UserLocks;
use crate::log::{LogBackend, LogKind, RecordLog};
use crate::sanitize::is_secure_segment;

/// Timestamp format written to the submission log
pub const SUBMISSION_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// One formal submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionEvent {
    pub identity_hash: String,
    /// Server local time
    pub submitted_at: NaiveDateTime,
}

impl SubmissionEvent {
    fn to_record(&self) -> String {
        format!(
            "{} {}",
            self.identity_hash,
            self.submitted_at.format(SUBMISSION_TIMESTAMP_FORMAT)
        )
    }
}

/// A submission together with whether late submission is allowed for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub event: SubmissionEvent,
    pub allow_late: bool,
}

/// Administrative actions recorded per user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    /// Late submission of this exercise is not penalized
    AllowLate(String),
}

impl AdminAction {
    fn to_record(&self) -> String {
        match self {
            AdminAction::AllowLate(hash) => format!("allow_late {}", hash),
        }
    }

    /// `None` for actions this version does not know about.
    fn parse(record: &str) -> Option<Self> {
        let mut fields = record.split_whitespace();
        match (fields.next(), fields.next()) {
            (Some("allow_late"), Some(hash)) => Some(AdminAction::AllowLate(hash.to_string())),
            _ => None,
        }
    }
}

/// Parse a submission log timestamp.
///
/// Accepts naive ISO-8601 date-times (with or without fractional seconds)
/// and RFC 3339 with an offset, which is converted to local time.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    text.parse::<NaiveDateTime>().ok().or_else(|| {
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Local).naive_local())
    })
}

fn parse_submission(record: &str, source: &str, line: usize) -> Result<SubmissionEvent, StoreError> {
    let fields: Vec<&str> = record.split_whitespace().collect();
    let [hash, stamp] = fields[..] else {
        return Err(StoreError::malformed(
            source,
            line,
            format!("expected 2 fields, found {}", fields.len()),
        ));
    };

    let submitted_at = parse_timestamp(stamp).ok_or_else(|| {
        StoreError::malformed(source, line, format!("invalid timestamp {:?}", stamp))
    })?;

    Ok(SubmissionEvent {
        identity_hash: hash.to_string(),
        submitted_at,
    })
}

/// Per-user submission and admin logs
pub struct SubmissionStore {
    submissions_dir: PathBuf,
    backend: Arc<dyn LogBackend>,
    locks: Arc<UserLocks>,
}

impl SubmissionStore {
    pub fn new<P: AsRef<Path>>(
        submissions_dir: P,
        backend: Arc<dyn LogBackend>,
        locks: Arc<UserLocks>,
    ) -> Result<Self, StoreError> {
        let submissions_dir = submissions_dir.as_ref().to_path_buf();
        fs::create_dir_all(&submissions_dir)?;

        info!(path = %submissions_dir.display(), "Initialized submission store");

        Ok(Self {
            submissions_dir,
            backend,
            locks,
        })
    }

    /// `submissions/<user>`, created if missing
    fn user_dir(&self, user: &str) -> Result<PathBuf, StoreError> {
        if user.is_empty() {
            return Err(StoreError::InvalidName("empty user name".to_string()));
        }
        let dir = self.submissions_dir.join(user);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn open_log(&self, user: &str, kind: LogKind) -> Result<Box<dyn RecordLog>, StoreError> {
        self.user_dir(user)?;
        let log = self.backend.open(user, kind)?;
        log.ensure_exists()?;
        Ok(log)
    }

    /// Where the code for `identity_hash` is kept.
    ///
    /// A stripped hash is plain base32, so it needs no sanitizing and can
    /// never name one of the log files kept beside it. Anything else means
    /// the hash itself is corrupt.
    pub fn snapshot_path(&self, user: &str, identity_hash: &str) -> Result<PathBuf, StoreError> {
        if user.is_empty() {
            return Err(StoreError::InvalidName("empty user name".to_string()));
        }
        let stripped = strip_padding(identity_hash);
        if !is_hash_token(stripped) || !is_secure_segment(stripped) {
            error!(user = %user, hash = %identity_hash, "Identity hash is not filesystem-safe");
            return Err(StoreError::Integrity(format!(
                "identity hash {:?} is not a valid path component",
                identity_hash
            )));
        }
        Ok(self.submissions_dir.join(user).join(stripped))
    }

    /// Record a submission made now.
    pub fn append_submission(
        &self,
        user: &str,
        identity_hash: &str,
        code: &str,
    ) -> Result<SubmissionEvent, StoreError> {
        self.append_submission_at(user, identity_hash, code, Local::now().naive_local())
    }

    /// Record a submission made at `submitted_at`.
    ///
    /// Overwrites any earlier snapshot for the same exercise.
    pub fn append_submission_at(
        &self,
        user: &str,
        identity_hash: &str,
        code: &str,
        submitted_at: NaiveDateTime,
    ) -> Result<SubmissionEvent, StoreError> {
        let snapshot = self.snapshot_path(user, identity_hash)?;

        // the log keeps microseconds
        let submitted_at = submitted_at
            .with_nanosecond(submitted_at.nanosecond() / 1_000 * 1_000)
            .unwrap_or(submitted_at);
        let event = SubmissionEvent {
            identity_hash: identity_hash.to_string(),
            submitted_at,
        };

        self.locks.with_user(user, || -> Result<(), StoreError> {
            let log = self.open_log(user, LogKind::Submission)?;
            fs::write(&snapshot, code.as_bytes())?;
            log.append(&event.to_record())
        })?;

        info!(
            user = %user,
            hash = %identity_hash,
            submitted_at = %event.submitted_at,
            "Recorded submission"
        );
        Ok(event)
    }

    /// All submissions in log order
    pub fn read_submissions(&self, user: &str) -> Result<Vec<SubmissionEvent>, StoreError> {
        let log = self.open_log(user, LogKind::Submission)?;
        let source = format!("{}/{}", user, LogKind::Submission);

        let events = log
            .scan()?
            .iter()
            .enumerate()
            .map(|(index, record)| parse_submission(record, &source, index + 1))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(user = %user, count = events.len(), "Read submission log");
        Ok(events)
    }

    /// Submissions in log order, each flagged with its late allowance
    pub fn read_submission_records(&self, user: &str) -> Result<Vec<SubmissionRecord>, StoreError> {
        let allowances = self.late_allowances(user)?;
        Ok(self
            .read_submissions(user)?
            .into_iter()
            .map(|event| SubmissionRecord {
                allow_late: allowances.contains(&event.identity_hash),
                event,
            })
            .collect())
    }

    /// Code as last submitted for `identity_hash`
    pub fn read_snapshot(&self, user: &str, identity_hash: &str) -> Result<Option<String>, StoreError> {
        let path = self.snapshot_path(user, identity_hash)?;
        match fs::read_to_string(&path) {
            Ok(code) => Ok(Some(code)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All admin actions in log order, unknown actions skipped
    pub fn admin_actions(&self, user: &str) -> Result<Vec<AdminAction>, StoreError> {
        let log = self.open_log(user, LogKind::Admin)?;
        Ok(log
            .scan()?
            .iter()
            .filter_map(|record| AdminAction::parse(record))
            .collect())
    }

    /// Hashes with a late allowance for `user`
    pub fn late_allowances(&self, user: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .admin_actions(user)?
            .into_iter()
            .map(|action| match action {
                AdminAction::AllowLate(hash) => hash,
            })
            .collect())
    }

    /// Allow `user` to submit `identity_hash` late without penalty.
    ///
    /// Granting an allowance that already exists changes nothing.
    pub fn grant_late_allowance(&self, user: &str, identity_hash: &str) -> Result<(), StoreError> {
        if identity_hash.is_empty() || identity_hash.contains(char::is_whitespace) {
            return Err(StoreError::InvalidName(format!(
                "identity hash {:?} cannot be logged",
                identity_hash
            )));
        }

        let added = self.locks.with_user(user, || -> Result<bool, StoreError> {
            if self.has_late_allowance(user, identity_hash)? {
                return Ok(false);
            }
            let log = self.open_log(user, LogKind::Admin)?;
            log.append(&AdminAction::AllowLate(identity_hash.to_string()).to_record())?;
            Ok(true)
        })?;

        if added {
            info!(user = %user, hash = %identity_hash, "Granted late allowance");
        } else {
            debug!(user = %user, hash = %identity_hash, "Late allowance already granted");
        }
        Ok(())
    }

    pub fn has_late_allowance(&self, user: &str, identity_hash: &str) -> Result<bool, StoreError> {
        Ok(self
            .admin_actions(user)?
            .iter()
            .any(|action| matches!(action, AdminAction::AllowLate(hash) if hash == identity_hash)))
    }
}
