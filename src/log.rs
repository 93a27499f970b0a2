//! Append-only record logs
//!
//! Submission logs, admin logs and the account table are all sequences of
//! one-line records that are only ever appended to and scanned in append
//! order. [`RecordLog`] is that interface; [`FileLog`] keeps the records in a
//! plain text file and [`SledLog`] in a sled tree.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::StoreError;

pub trait RecordLog: Send + Sync {
    /// Create the (empty) log if it does not exist yet.
    fn ensure_exists(&self) -> Result<(), StoreError>;

    /// Append one record. Records cannot contain line breaks.
    fn append(&self, record: &str) -> Result<(), StoreError>;

    /// All records in append order, blank lines omitted.
    fn scan(&self) -> Result<Vec<String>, StoreError>;
}

fn check_record(record: &str) -> Result<(), StoreError> {
    if record.contains(['\n', '\r']) {
        return Err(StoreError::InvalidName(format!(
            "log record contains a line break: {:?}",
            record
        )));
    }
    Ok(())
}

/// Line-oriented log in a single text file
#[derive(Debug, Clone)]
pub struct FileLog {
    path: PathBuf,
}

impl FileLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordLog for FileLog {
    fn ensure_exists(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // create + append never truncates, so racing creators are harmless
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(())
    }

    fn append(&self, record: &str) -> Result<(), StoreError> {
        check_record(record)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&self.path)?;

        // a hand-edited file may lack its final newline
        let mut line = String::with_capacity(record.len() + 2);
        if file.metadata()?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                line.push('\n');
            }
        }
        line.push_str(record);
        line.push('\n');

        // single write so the line lands in one append
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<String>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(content
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Log stored as a sled tree keyed by monotonically increasing ids
pub struct SledLog {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledLog {
    pub fn open(db: &sled::Db, name: &str) -> Result<Self, StoreError> {
        let tree = db.open_tree(name)?;
        Ok(Self {
            db: db.clone(),
            tree,
        })
    }
}

impl RecordLog for SledLog {
    fn ensure_exists(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn append(&self, record: &str) -> Result<(), StoreError> {
        check_record(record)?;
        let id = self.db.generate_id()?;
        // big-endian keys iterate in id order
        self.tree.insert(id.to_be_bytes(), record.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<String>, StoreError> {
        let mut records = Vec::new();
        for item in self.tree.iter() {
            let (_, value) = item?;
            let record = String::from_utf8(value.to_vec()).map_err(|e| {
                StoreError::Integrity(format!("non UTF-8 record in log tree: {}", e))
            })?;
            if !record.trim().is_empty() {
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// The two per-user logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    Submission,
    Admin,
}

impl LogKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            LogKind::Submission => "submission_log",
            LogKind::Admin => "admin_log",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Opens the per-user logs
pub trait LogBackend: Send + Sync {
    fn open(&self, user: &str, kind: LogKind) -> Result<Box<dyn RecordLog>, StoreError>;
}

/// `submissions/<user>/<submission_log|admin_log>`
#[derive(Debug, Clone)]
pub struct FileLogBackend {
    submissions_dir: PathBuf,
}

impl FileLogBackend {
    pub fn new<P: AsRef<Path>>(submissions_dir: P) -> Self {
        Self {
            submissions_dir: submissions_dir.as_ref().to_path_buf(),
        }
    }
}

impl LogBackend for FileLogBackend {
    fn open(&self, user: &str, kind: LogKind) -> Result<Box<dyn RecordLog>, StoreError> {
        let path = self.submissions_dir.join(user).join(kind.file_name());
        debug!(user = %user, log = %kind, path = %path.display(), "Opening file log");
        Ok(Box::new(FileLog::new(path)))
    }
}

/// One tree per user and log inside a shared sled database
pub struct SledLogBackend {
    db: sled::Db,
}

impl SledLogBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Opened log database");
        Ok(Self { db })
    }
}

impl LogBackend for SledLogBackend {
    fn open(&self, user: &str, kind: LogKind) -> Result<Box<dyn RecordLog>, StoreError> {
        Ok(Box::new(SledLog::open(&self.db, &format!("{}/{}", user, kind))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise_log(log: &dyn RecordLog) {
        log.ensure_exists().unwrap();
        assert!(log.scan().unwrap().is_empty());

        log.append("HASHA 2024-05-01T22:00:00.000000").unwrap();
        log.append("HASHB 2024-05-02T00:00:00.000000").unwrap();
        log.append("HASHA 2024-05-03T09:30:00.000000").unwrap();

        assert_eq!(
            log.scan().unwrap(),
            vec![
                "HASHA 2024-05-01T22:00:00.000000",
                "HASHB 2024-05-02T00:00:00.000000",
                "HASHA 2024-05-03T09:30:00.000000",
            ]
        );

        assert!(matches!(
            log.append("two\nlines"),
            Err(StoreError::InvalidName(_))
        ));
        assert_eq!(log.scan().unwrap().len(), 3);
    }

    #[test]
    fn test_file_log() {
        let temp_dir = TempDir::new().unwrap();
        let log = FileLog::new(temp_dir.path().join("s1").join("submission_log"));
        exercise_log(&log);
        assert!(log.path().exists());
    }

    #[test]
    fn test_sled_log() {
        let temp_dir = TempDir::new().unwrap();
        let backend = SledLogBackend::open(temp_dir.path().join("logs.sled")).unwrap();
        let log = backend.open("s1", LogKind::Submission).unwrap();
        exercise_log(log.as_ref());

        // logs of different kinds are independent
        let admin = backend.open("s1", LogKind::Admin).unwrap();
        assert!(admin.scan().unwrap().is_empty());
    }

    #[test]
    fn test_file_log_missing_scans_empty() {
        let temp_dir = TempDir::new().unwrap();
        let log = FileLog::new(temp_dir.path().join("nothing_here"));
        assert!(log.scan().unwrap().is_empty());
        assert!(!log.path().exists());
    }

    #[test]
    fn test_ensure_exists_keeps_content() {
        let temp_dir = TempDir::new().unwrap();
        let log = FileLog::new(temp_dir.path().join("admin_log"));
        log.append("allow_late HASHA").unwrap();
        log.ensure_exists().unwrap();
        assert_eq!(log.scan().unwrap(), vec!["allow_late HASHA"]);
    }

    #[test]
    fn test_append_after_unterminated_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("user_info");
        fs::write(&path, "a1,Ada,ada@x.edu,enrolled").unwrap();

        let log = FileLog::new(&path);
        log.append("a2,Alan,alan@x.edu,enrolled").unwrap();
        log.append("a3,Grace,grace@x.edu,enrolled").unwrap();

        assert_eq!(
            log.scan().unwrap(),
            vec![
                "a1,Ada,ada@x.edu,enrolled",
                "a2,Alan,alan@x.edu,enrolled",
                "a3,Grace,grace@x.edu,enrolled",
            ]
        );
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "a1,Ada,ada@x.edu,enrolled\na2,Alan,alan@x.edu,enrolled\na3,Grace,grace@x.edu,enrolled\n"
        );
    }

    #[test]
    fn test_file_backend_layout() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileLogBackend::new(temp_dir.path());
        let log = backend.open("s1", LogKind::Admin).unwrap();
        log.ensure_exists().unwrap();
        assert!(temp_dir.path().join("s1").join("admin_log").is_file());
    }
}
