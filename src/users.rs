//! Account directory
//!
//! A flat `user_info` table, one `id,name,email,enrolled|not_enrolled` line
//! per account. Lines starting with `#` are comments. Accounts are only ever
//! added; an existing id is never rewritten.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::locks::{UserLocks, USER_TABLE_KEY};
use crate::log::{FileLog, RecordLog};

const COMMENT_MARKER: char = '#';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrollmentState {
    Enrolled,
    NotEnrolled,
}

impl EnrollmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentState::Enrolled => "enrolled",
            EnrollmentState::NotEnrolled => "not_enrolled",
        }
    }
}

impl fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrollmentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enrolled" => Ok(EnrollmentState::Enrolled),
            "not_enrolled" => Ok(EnrollmentState::NotEnrolled),
            other => Err(format!("unknown enrollment state {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub enrollment_state: EnrollmentState,
}

impl Account {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        email: impl Into<String>,
        enrollment_state: EnrollmentState,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: email.into(),
            enrollment_state,
        }
    }

    fn to_record(&self) -> Result<String, StoreError> {
        for (field, value) in [
            ("id", &self.id),
            ("name", &self.display_name),
            ("email", &self.email),
        ] {
            if value.contains([',', '\n', '\r']) {
                return Err(StoreError::InvalidName(format!(
                    "account {} {:?} cannot contain ',' or line breaks",
                    field, value
                )));
            }
        }
        if self.id.is_empty() || self.id.starts_with(COMMENT_MARKER) {
            return Err(StoreError::InvalidName(format!("invalid account id {:?}", self.id)));
        }

        Ok(format!(
            "{},{},{},{}",
            self.id, self.display_name, self.email, self.enrollment_state
        ))
    }

    fn parse(record: &str, source: &str, line: usize) -> Result<Self, StoreError> {
        let fields: Vec<&str> = record.trim().split(',').collect();
        let [id, name, email, enrolled] = fields[..] else {
            return Err(StoreError::malformed(
                source,
                line,
                format!("expected 4 fields, found {}", fields.len()),
            ));
        };
        let enrollment_state = enrolled
            .parse::<EnrollmentState>()
            .map_err(|reason| StoreError::malformed(source, line, reason))?;
        Ok(Account::new(id, name, email, enrollment_state))
    }

    fn matches(&self, query: &str) -> bool {
        [&self.id, &self.display_name, &self.email]
            .iter()
            .any(|field| field.to_lowercase().contains(query))
    }
}

/// Built-in sort orders for [`UserDirectory::search`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccountOrdering {
    #[default]
    ById,
    ByName,
    ByEmail,
}

impl AccountOrdering {
    fn compare(&self, a: &Account, b: &Account) -> Ordering {
        match self {
            AccountOrdering::ById => a.id.cmp(&b.id),
            AccountOrdering::ByName => a.display_name.cmp(&b.display_name),
            AccountOrdering::ByEmail => a.email.cmp(&b.email),
        }
    }
}

pub struct UserDirectory {
    table: FileLog,
    locks: Arc<UserLocks>,
}

impl UserDirectory {
    pub fn new<P: AsRef<Path>>(path: P, locks: Arc<UserLocks>) -> Self {
        Self {
            table: FileLog::new(path),
            locks,
        }
    }

    /// Every account in table order. A missing table is empty.
    pub fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let source = self.table.path().display().to_string();
        // scan() drops blank lines, so count positions from the raw file
        let content = match fs::read_to_string(self.table.path()) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with(COMMENT_MARKER))
            .map(|(index, line)| Account::parse(line, &source, index + 1))
            .collect()
    }

    pub fn find(&self, id: &str) -> Result<Option<Account>, StoreError> {
        let account = self.accounts()?.into_iter().find(|account| account.id == id);
        debug!(id = %id, found = account.is_some(), "Account lookup");
        Ok(account)
    }

    /// Accounts whose id, name or email contains `query` (case-insensitive),
    /// optionally restricted to one enrollment state. Sorted by id unless
    /// another ordering is given.
    pub fn search(
        &self,
        query: &str,
        enrollment: Option<EnrollmentState>,
        ordering: Option<AccountOrdering>,
    ) -> Result<Vec<Account>, StoreError> {
        let ordering = ordering.unwrap_or_default();
        self.search_by(query, enrollment, |a, b| ordering.compare(a, b))
    }

    /// [`search`](Self::search) with a caller-supplied comparator
    pub fn search_by<F>(
        &self,
        query: &str,
        enrollment: Option<EnrollmentState>,
        mut compare: F,
    ) -> Result<Vec<Account>, StoreError>
    where
        F: FnMut(&Account, &Account) -> Ordering,
    {
        let query = query.to_lowercase();
        let mut accounts: Vec<Account> = self
            .accounts()?
            .into_iter()
            .filter(|account| account.matches(&query))
            .filter(|account| enrollment.map_or(true, |state| account.enrollment_state == state))
            .collect();
        accounts.sort_by(|a, b| compare(a, b));
        Ok(accounts)
    }

    /// Add `account` unless its id is already known. Returns whether it was
    /// added; the existing record is left untouched either way.
    pub fn add(&self, account: &Account) -> Result<bool, StoreError> {
        let record = account.to_record()?;

        let added = self.locks.with_user(USER_TABLE_KEY, || -> Result<bool, StoreError> {
            if self.find(&account.id)?.is_some() {
                return Ok(false);
            }
            self.table.append(&record)?;
            Ok(true)
        })?;

        if added {
            info!(id = %account.id, "Added account");
        }
        Ok(added)
    }
}
