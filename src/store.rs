//! # Module: store
//!
//! ## Responsibility
//! Hold the state that lives between analysis cycles: the append-only
//! outcome log, the previous cycle's pattern snapshot, and fix proposals.
//!
//! Two backends implement [`Store`]:
//!
//! - [`JsonlStore`] lays files out under a data directory:
//!
//!   ```text
//!   <data_dir>/
//!     outcomes.jsonl          one Outcome per line, append-only
//!     patterns.json           {"patterns": [...]}, overwritten each cycle
//!     proposals/<fix id>.json one Fix per file
//!   ```
//!
//! - [`MemoryStore`] keeps the same data in memory, for tests and embedding.
//!
//! ## Guarantees
//! - Writes are serialized per store instance
//! - A malformed outcome line or proposal file is skipped with a warning, never
//!   fatal
//! - A missing or unreadable `patterns.json` reads as an empty previous set
//!
//! ## NOT Responsible For
//! - Coordinating writers across processes

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AnalysisWindow;
use crate::error::{Result, RsiError};
use crate::types::{Fix, Outcome, Pattern};

pub const OUTCOMES_FILE: &str = "outcomes.jsonl";
pub const PATTERNS_FILE: &str = "patterns.json";
pub const PROPOSALS_DIR: &str = "proposals";

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Persistence for outcomes, the previous pattern set and fix proposals.
pub trait Store: Send + Sync {
    fn append_outcome(&self, outcome: &Outcome) -> Result<()>;

    /// Outcomes inside `window`, oldest first. Time windows are measured back
    /// from `now`.
    fn load_outcomes(&self, window: AnalysisWindow, now: DateTime<Utc>) -> Result<Vec<Outcome>>;

    /// The pattern set saved by the previous cycle.
    fn load_patterns(&self) -> Result<Vec<Pattern>>;

    /// Replace the saved pattern set.
    fn save_patterns(&self, patterns: &[Pattern]) -> Result<()>;

    /// Write a fix, replacing any earlier fix with the same id.
    fn save_fix(&self, fix: &Fix) -> Result<()>;

    /// Every saved fix, ordered by id.
    fn load_fixes(&self) -> Result<Vec<Fix>>;
}

/// Apply `window` to outcomes in append order. Returns them oldest first.
pub fn select_window(mut outcomes: Vec<Outcome>, window: AnalysisWindow, now: DateTime<Utc>) -> Vec<Outcome> {
    // Stable: equal timestamps keep append order.
    outcomes.sort_by_key(|o| o.timestamp);
    match (window, window.span()) {
        (AnalysisWindow::Records(n), _) => {
            let skip = outcomes.len().saturating_sub(n);
            outcomes.split_off(skip)
        }
        (_, Some(span)) => {
            // A span reaching past the earliest representable time keeps everything.
            if let Some(cutoff) = now.checked_sub_signed(span) {
                outcomes.retain(|o| o.timestamp >= cutoff);
            }
            outcomes
        }
        (_, None) => outcomes,
    }
}

// ---------------------------------------------------------------------------
// JsonlStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct PatternSnapshot {
    #[serde(default)]
    patterns: Vec<Pattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
}

/// File-backed store rooted at a data directory.
#[derive(Debug)]
pub struct JsonlStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    /// Open (creating if needed) a store under `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| RsiError::io(&root, e))?;
        debug!(target: "rsi_loop::store", root = %root.display(), "opened jsonl store");
        Ok(Self { root, write_lock: Mutex::new(()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn outcomes_path(&self) -> PathBuf {
        self.root.join(OUTCOMES_FILE)
    }

    pub fn patterns_path(&self) -> PathBuf {
        self.root.join(PATTERNS_FILE)
    }

    pub fn proposals_dir(&self) -> PathBuf {
        self.root.join(PROPOSALS_DIR)
    }

    fn read_all_outcomes(&self) -> Result<Vec<Outcome>> {
        let path = self.outcomes_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RsiError::io(&path, e)),
        };

        let mut outcomes = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Outcome>(line) {
                Ok(o) => outcomes.push(o),
                Err(e) => warn!(
                    target: "rsi_loop::store",
                    line = idx + 1,
                    error = %e,
                    "skipping malformed outcome record"
                ),
            }
        }
        Ok(outcomes)
    }

    /// Write `contents` to `path` via a sibling temp file and rename.
    fn write_replace(path: &Path, contents: &str) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents).map_err(|e| RsiError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| RsiError::io(path, e))
    }
}

impl Store for JsonlStore {
    fn append_outcome(&self, outcome: &Outcome) -> Result<()> {
        let line = serde_json::to_string(outcome).map_err(|e| RsiError::json("outcome record", e))?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.outcomes_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| RsiError::io(&path, e))?;
        writeln!(file, "{}", line).map_err(|e| RsiError::io(&path, e))
    }

    fn load_outcomes(&self, window: AnalysisWindow, now: DateTime<Utc>) -> Result<Vec<Outcome>> {
        Ok(select_window(self.read_all_outcomes()?, window, now))
    }

    fn load_patterns(&self) -> Result<Vec<Pattern>> {
        let path = self.patterns_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                warn!(target: "rsi_loop::store", path = %path.display(), error = %e, "previous patterns unreadable");
                return Ok(Vec::new());
            }
        };
        match serde_json::from_str::<PatternSnapshot>(&raw) {
            Ok(snapshot) => Ok(snapshot.patterns),
            Err(e) => {
                warn!(target: "rsi_loop::store", path = %path.display(), error = %e, "previous patterns malformed");
                Ok(Vec::new())
            }
        }
    }

    fn save_patterns(&self, patterns: &[Pattern]) -> Result<()> {
        let snapshot = PatternSnapshot { patterns: patterns.to_vec(), saved_at: Some(Utc::now()) };
        let body = serde_json::to_string_pretty(&snapshot).map_err(|e| RsiError::json("pattern snapshot", e))?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        Self::write_replace(&self.patterns_path(), &body)
    }

    fn save_fix(&self, fix: &Fix) -> Result<()> {
        let body = serde_json::to_string_pretty(fix).map_err(|e| RsiError::json(format!("fix {}", fix.id), e))?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let dir = self.proposals_dir();
        fs::create_dir_all(&dir).map_err(|e| RsiError::io(&dir, e))?;
        Self::write_replace(&dir.join(format!("{}.json", fix.id)), &body)
    }

    fn load_fixes(&self) -> Result<Vec<Fix>> {
        let dir = self.proposals_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RsiError::io(&dir, e)),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut fixes = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<Fix>(&raw).map_err(|e| e.to_string()));
            match parsed {
                Ok(fix) => fixes.push(fix),
                Err(error) => warn!(
                    target: "rsi_loop::store",
                    path = %path.display(),
                    error = %error,
                    "skipping unreadable fix proposal"
                ),
            }
        }
        fixes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(fixes)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    outcomes: Vec<Outcome>,
    patterns: Vec<Pattern>,
    fixes: std::collections::BTreeMap<String, Fix>,
}

/// In-memory store with the same contract as [`JsonlStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outcomes recorded so far.
    pub fn outcome_count(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).outcomes.len()
    }
}

impl Store for MemoryStore {
    fn append_outcome(&self, outcome: &Outcome) -> Result<()> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).outcomes.push(outcome.clone());
        Ok(())
    }

    fn load_outcomes(&self, window: AnalysisWindow, now: DateTime<Utc>) -> Result<Vec<Outcome>> {
        let all = self.state.lock().unwrap_or_else(PoisonError::into_inner).outcomes.clone();
        Ok(select_window(all, window, now))
    }

    fn load_patterns(&self) -> Result<Vec<Pattern>> {
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner).patterns.clone())
    }

    fn save_patterns(&self, patterns: &[Pattern]) -> Result<()> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).patterns = patterns.to_vec();
        Ok(())
    }

    fn save_fix(&self, fix: &Fix) -> Result<()> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fixes
            .insert(fix.id.clone(), fix.clone());
        Ok(())
    }

    fn load_fixes(&self) -> Result<Vec<Fix>> {
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner).fixes.values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
