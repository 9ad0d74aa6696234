//! Append-only history of produced artifact names.
//!
//! The log is a UTF-8 text file with one file name per line and nothing
//! else. It is read once when the ledger is opened; afterwards every
//! [`HistoryLedger::record`] appends one line, flushes and syncs it before
//! updating the in-memory list, so a crash can lose at most the entry being
//! written, never corrupt an earlier one.
//!
//! A single mutex serialises `record` calls, which keeps concurrent runs in
//! one process from interleaving partial lines.

use crate::error::DigestError;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug)]
struct LedgerState {
    entries: Vec<String>,
    /// The file on disk does not end with a newline (hand-edited or
    /// truncated); the next append must start one.
    needs_newline: bool,
}

/// Ordered, append-only list of artifact file names backed by a log file.
#[derive(Debug)]
pub struct HistoryLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl HistoryLedger {
    /// Open the ledger at `path`, reading any existing entries.
    ///
    /// A missing file is an empty history; the file is created on the first
    /// `record`. Blank lines are skipped.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, DigestError> {
        let path = path.into();
        let (entries, needs_newline) = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let entries: Vec<String> = contents
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
                let needs_newline = !contents.is_empty() && !contents.ends_with('\n');
                (entries, needs_newline)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => (Vec::new(), false),
            Err(source) => return Err(DigestError::HistoryIo { path, source }),
        };
        debug!("Loaded {} history entries from {}", entries.len(), path.display());

        Ok(Self {
            path,
            state: Mutex::new(LedgerState {
                entries,
                needs_newline,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `filename` to the log and the in-memory list.
    ///
    /// Names containing a line break would corrupt the one-per-line format
    /// and are rejected.
    pub fn record(&self, filename: &str) -> Result<(), DigestError> {
        let filename = filename.trim();
        if filename.is_empty() || filename.contains(['\n', '\r']) {
            return Err(DigestError::InvalidConfig(format!(
                "history entry must be a single non-empty line, got {filename:?}"
            )));
        }

        let mut state = self.lock();
        let mut line = String::with_capacity(filename.len() + 2);
        if state.needs_newline {
            line.push('\n');
        }
        line.push_str(filename);
        line.push('\n');

        self.append(line.as_bytes())
            .map_err(|source| DigestError::HistoryIo {
                path: self.path.clone(),
                source,
            })?;

        state.needs_newline = false;
        state.entries.push(filename.to_string());
        debug!("Recorded history entry {}", filename);
        Ok(())
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let state = self.lock();
        let start = state.entries.len().saturating_sub(n);
        state.entries[start..].to_vec()
    }

    /// Every entry, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_data()
    }
}
