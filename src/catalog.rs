//! Exercise catalog and hash chain resolution
//!
//! The catalog (`tutorial_hashes`) lists the currently active revision of
//! every exercise, one per line:
//!
//! ```text
//! <hash> <due HH_DD/MM/YY> <package> <problem_set> <exercise>
//! ```
//!
//! Exercises get renamed and edited between terms, which changes their
//! identity hash, while old client installs keep submitting under the old
//! hash. The hash mappings file (`tutorial_hash_mappings`, a JSON object)
//! forwards each superseded hash to its replacement, or to `null` when the
//! exercise was withdrawn. Resolution follows those links until it reaches a
//! hash in the catalog.
//!
//! Both files are produced by the package build scripts and treated as
//! trusted: any malformed line fails the whole load. Detecting two current
//! exercises with the same hash is the build scripts' job, not ours.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

use crate::error::StoreError;

/// Date part of the catalog due field
pub const DUE_DATE_FORMAT: &str = "%d/%m/%y";

/// One active exercise revision
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExerciseIdentity {
    pub identity_hash: String,
    /// Server local time
    pub due_at: NaiveDateTime,
    pub package_name: String,
    pub problem_set_name: String,
    pub exercise_name: String,
}

/// Parse a due field of the form `HH_DD/MM/YY`.
pub fn parse_due(field: &str) -> Option<NaiveDateTime> {
    let (hour, date) = field.split_once('_')?;
    let hour: u32 = hour.parse().ok()?;
    NaiveDate::parse_from_str(date, DUE_DATE_FORMAT)
        .ok()?
        .and_hms_opt(hour, 0, 0)
}

/// Format a due time back into `HH_DD/MM/YY`.
pub fn format_due(due_at: &NaiveDateTime) -> String {
    due_at.format("%H_%d/%m/%y").to_string()
}

/// Parse catalog text. `source_file` only labels errors.
pub fn parse_catalog(text: &str, source_file: &str) -> Result<Vec<ExerciseIdentity>, StoreError> {
    let mut identities = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [hash, due, package, problem_set, exercise] = fields[..] else {
            return Err(StoreError::malformed(
                source_file,
                index + 1,
                format!("expected 5 fields, found {}", fields.len()),
            ));
        };

        let due_at = parse_due(due).ok_or_else(|| {
            StoreError::malformed(source_file, index + 1, format!("invalid due time {:?}", due))
        })?;

        identities.push(ExerciseIdentity {
            identity_hash: hash.to_string(),
            due_at,
            package_name: package.to_string(),
            problem_set_name: problem_set.to_string(),
            exercise_name: exercise.to_string(),
        });
    }

    Ok(identities)
}

/// Forwarding links from superseded hashes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashChain {
    links: HashMap<String, Option<String>>,
}

impl HashChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON mappings object.
    pub fn from_json(text: &str, source_file: &str) -> Result<Self, StoreError> {
        let links: HashMap<String, Option<String>> = serde_json::from_str(text)
            .map_err(|e| StoreError::malformed(source_file, e.line(), e.to_string()))?;
        Ok(Self { links })
    }

    /// Load from file; a missing file is an empty chain.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text, &path.display().to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "No hash mappings file, using empty chain");
                Ok(Self::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record that `old` was replaced by `new` (`None` = withdrawn).
    pub fn insert(&mut self, old: impl Into<String>, new: Option<String>) {
        self.links.insert(old.into(), new);
    }

    /// `None` if `hash` has no link; `Some(None)` if it was withdrawn.
    pub fn next(&self, hash: &str) -> Option<Option<&str>> {
        self.links.get(hash).map(|next| next.as_deref())
    }

    pub fn superseded(&self) -> impl Iterator<Item = &str> {
        self.links.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Active exercises plus the chain of superseded hashes
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    identities: HashMap<String, ExerciseIdentity>,
    /// Hashes in catalog file order
    order: Vec<String>,
    chain: HashChain,
}

impl Catalog {
    /// Load `tutorial_hashes` and `tutorial_hash_mappings`.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        catalog_path: P,
        mappings_path: Q,
    ) -> Result<Self, StoreError> {
        let catalog_path = catalog_path.as_ref();
        let text = fs::read_to_string(catalog_path)?;
        let identities = parse_catalog(&text, &catalog_path.display().to_string())?;
        let chain = HashChain::load(mappings_path)?;

        let catalog = Self::from_parts(identities, chain);
        info!(
            exercises = catalog.len(),
            superseded = catalog.chain.len(),
            "Loaded exercise catalog"
        );
        Ok(catalog)
    }

    /// Build from parsed parts. A repeated hash keeps its first position and
    /// its last record.
    pub fn from_parts(identities: Vec<ExerciseIdentity>, chain: HashChain) -> Self {
        let mut catalog = Self {
            chain,
            ..Default::default()
        };
        for identity in identities {
            let hash = identity.identity_hash.clone();
            if catalog.identities.insert(hash.clone(), identity).is_none() {
                catalog.order.push(hash);
            }
        }
        catalog
    }

    /// Active exercise with exactly this hash
    pub fn get(&self, hash: &str) -> Option<&ExerciseIdentity> {
        self.identities.get(hash)
    }

    /// Current identity for any historical or current hash.
    ///
    /// `Ok(None)` when the chain ends in a withdrawal or an unknown hash. A
    /// chain that revisits a hash is an integrity fault.
    pub fn resolve(&self, hash: &str) -> Result<Option<&ExerciseIdentity>, StoreError> {
        let mut current = hash;

        // an acyclic walk follows at most chain.len() links
        for _ in 0..=self.chain.len() {
            if let Some(identity) = self.identities.get(current) {
                return Ok(Some(identity));
            }
            match self.chain.next(current) {
                Some(Some(next)) => current = next,
                Some(None) | None => return Ok(None),
            }
        }

        warn!(hash = %hash, "Hash chain does not terminate");
        Err(StoreError::Integrity(format!(
            "hash chain starting at {} contains a cycle",
            hash
        )))
    }

    /// Active exercises in catalog file order
    pub fn ordered(&self) -> Vec<&ExerciseIdentity> {
        self.order
            .iter()
            .filter_map(|hash| self.identities.get(hash))
            .collect()
    }

    pub fn identities(&self) -> impl Iterator<Item = &ExerciseIdentity> {
        self.identities.values()
    }

    /// Every resolvable hash, current and superseded, mapped to its
    /// current identity
    pub fn resolved_table(&self) -> Result<HashMap<&str, &ExerciseIdentity>, StoreError> {
        let mut table: HashMap<&str, &ExerciseIdentity> = self
            .identities
            .iter()
            .map(|(hash, identity)| (hash.as_str(), identity))
            .collect();

        for old in self.chain.superseded() {
            if let Some(identity) = self.resolve(old)? {
                table.entry(old).or_insert(identity);
            }
        }
        Ok(table)
    }

    pub fn chain(&self) -> &HashChain {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
