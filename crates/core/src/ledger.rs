//! Durable source-id → target-id mapping ledger
//!
//! The ledger is the single source of truth for "may this source record be
//! deleted": a source code is only ever eligible for deletion once its
//! replacement's id has been appended here and flushed. Entries are written
//! one at a time, as soon as each target code is created, so a crash mid-run
//! loses at most the one in-flight item. Re-loading the file on the next run
//! is the resume mechanism.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::csv;

const LEDGER_HEADER: [&str; 3] = ["source_id", "target_id", "created_at"];

/// One confirmed source → target correspondence.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub source_id: u64,
    pub target_id: u64,
    pub created_at: String,
}

/// Error type for ledger operations
#[derive(Debug)]
pub enum LedgerError {
    IoError(String),
    Malformed { line: usize, reason: String },
    DuplicateMapping(u64),
    Locked(PathBuf),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::IoError(msg) => write!(f, "IO error: {}", msg),
            LedgerError::Malformed { line, reason } => {
                write!(f, "malformed ledger line {}: {}", line, reason)
            }
            LedgerError::DuplicateMapping(id) => {
                write!(f, "ledger already has a mapping for source id {}", id)
            }
            LedgerError::Locked(path) => {
                write!(
                    f,
                    "ledger is locked by another run (remove {} if that run is dead)",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::IoError(err.to_string())
    }
}

/// Append-only, immediately-flushed mapping store.
#[derive(Debug)]
pub struct MappingLedger {
    file: fs::File,
    entries: Vec<MappingEntry>,
    index: HashMap<u64, u64>,
}

impl MappingLedger {
    /// Open the ledger at `path`, creating it (with its header) if absent.
    ///
    /// A malformed line aborts the load: the ledger gates deletions, so a
    /// ledger that cannot be trusted must stop the run before any mutation.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let existing = if path.exists() {
            fs::read_to_string(path)?
        } else {
            String::new()
        };

        let mut entries = Vec::new();
        let mut index = HashMap::new();

        let rows = csv::parse_document(&existing);

        // The first row must be the header; a headerless file would have its
        // first mapping silently dropped here instead of resumed.
        if let Some(header) = rows.first() {
            let matches = header.len() == LEDGER_HEADER.len()
                && header.iter().zip(LEDGER_HEADER).all(|(a, b)| a.as_str() == b);
            if !matches {
                return Err(LedgerError::Malformed {
                    line: 1,
                    reason: format!("expected header {:?}, found {:?}", LEDGER_HEADER, header),
                });
            }
        }

        for (i, row) in rows.iter().enumerate().skip(1) {
            let entry = parse_entry(row).map_err(|reason| LedgerError::Malformed {
                line: i + 1,
                reason,
            })?;

            if index.insert(entry.source_id, entry.target_id).is_some() {
                return Err(LedgerError::Malformed {
                    line: i + 1,
                    reason: format!("duplicate source id {}", entry.source_id),
                });
            }
            entries.push(entry);
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        if existing.is_empty() {
            file.write_all(csv::encode_row(&LEDGER_HEADER).as_bytes())?;
            file.sync_data()?;
        }

        Ok(Self {
            file,
            entries,
            index,
        })
    }

    /// Does the ledger hold a mapping for this source id?
    pub fn has(&self, source_id: u64) -> bool {
        self.index.contains_key(&source_id)
    }

    /// Target id mapped to the given source id, if any.
    pub fn target_of(&self, source_id: u64) -> Option<u64> {
        self.index.get(&source_id).copied()
    }

    /// Record a new mapping and flush it to disk before returning.
    ///
    /// A second `put` for the same source id is rejected: overwriting an
    /// entry would silently orphan the target record it pointed at.
    pub fn put(&mut self, source_id: u64, target_id: u64) -> Result<(), LedgerError> {
        if self.has(source_id) {
            return Err(LedgerError::DuplicateMapping(source_id));
        }

        let entry = MappingEntry {
            source_id,
            target_id,
            created_at: Utc::now().to_rfc3339(),
        };

        let line = csv::encode_row(&[
            &entry.source_id.to_string(),
            &entry.target_id.to_string(),
            &entry.created_at,
        ]);
        self.file.write_all(line.as_bytes())?;
        self.file.sync_data()?;

        self.index.insert(entry.source_id, entry.target_id);
        self.entries.push(entry);
        Ok(())
    }

    /// All entries, oldest first.
    pub fn all(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_entry(row: &[String]) -> Result<MappingEntry, String> {
    if row.len() != 3 {
        return Err(format!("expected 3 fields, found {}", row.len()));
    }

    let source_id: u64 = row[0]
        .trim()
        .parse()
        .map_err(|_| format!("invalid source id {:?}", row[0]))?;
    let target_id: u64 = row[1]
        .trim()
        .parse()
        .map_err(|_| format!("invalid target id {:?}", row[1]))?;

    Ok(MappingEntry {
        source_id,
        target_id,
        created_at: row[2].clone(),
    })
}

/// Exclusive-run guard for a ledger file.
///
/// The ledger assumes a single writer; concurrent runs could interleave
/// appends and break the delete-only-if-mapped invariant. The lock is a
/// sibling `.lock` file created with `create_new` and removed on drop.
#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
}

impl LedgerLock {
    pub fn acquire(ledger_path: &Path) -> Result<Self, LedgerError> {
        let mut lock_name = ledger_path.as_os_str().to_os_string();
        lock_name.push(".lock");
        let path = PathBuf::from(lock_name);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(LedgerError::Locked(path))
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
