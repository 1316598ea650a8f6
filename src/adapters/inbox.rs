//! File-drop inbox.
//!
//! Any process that can write a file can report outcomes: drop a JSON object
//! such as
//!
//! ```json
//! {"task": "search", "success": false, "error": "timeout after 30s"}
//! ```
//!
//! into the watch directory and call [`InboxAdapter::poll`]. Each ingested
//! file is moved to `.processed/`. Files that fail to parse are left where
//! they are and skipped.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, RsiError};
use crate::observer::Observer;
use crate::types::Outcome;

pub const PROCESSED_DIR: &str = ".processed";

/// Polls a directory for outcome files.
#[derive(Debug, Clone)]
pub struct InboxAdapter {
    observer: Observer,
    watch_dir: PathBuf,
}

impl InboxAdapter {
    pub fn new(observer: Observer, watch_dir: impl Into<PathBuf>) -> Self {
        Self { observer, watch_dir: watch_dir.into() }
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.watch_dir.join(PROCESSED_DIR)
    }

    /// Ingest every pending `*.json` file, in file-name order.
    ///
    /// A missing watch directory yields nothing.
    pub fn poll(&self) -> Result<Vec<Outcome>> {
        let entries = match fs::read_dir(&self.watch_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RsiError::io(&self.watch_dir, e)),
        };

        let mut pending: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_inbox_file(p))
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        pending.sort();

        let processed = self.processed_dir();
        fs::create_dir_all(&processed).map_err(|e| RsiError::io(&processed, e))?;

        let mut recorded = Vec::with_capacity(pending.len());
        for path in pending {
            let outcome = match read_outcome(&path) {
                Ok(o) => o,
                Err(e) => {
                    warn!(target: "rsi_loop::inbox", path = %path.display(), error = %e, "skipping inbox file");
                    continue;
                }
            };
            // Recorded only once the file has left the inbox.
            let Some(name) = path.file_name() else { continue };
            let dest = processed.join(name);
            fs::rename(&path, &dest).map_err(|e| RsiError::io(&path, e))?;

            match self.observer.record(outcome) {
                Ok(outcome) => recorded.push(outcome),
                Err(e) => {
                    if let Err(restore) = fs::rename(&dest, &path) {
                        warn!(
                            target: "rsi_loop::inbox",
                            path = %dest.display(),
                            error = %restore,
                            "could not return unrecorded file to inbox"
                        );
                    }
                    return Err(e);
                }
            }
        }

        debug!(target: "rsi_loop::inbox", count = recorded.len(), "inbox polled");
        Ok(recorded)
    }
}

fn is_inbox_file(path: &Path) -> bool {
    let visible = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| !n.starts_with('.'));
    visible && path.extension().is_some_and(|ext| ext == "json")
}

fn read_outcome(path: &Path) -> Result<Outcome> {
    let raw = fs::read_to_string(path).map_err(|e| RsiError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| RsiError::json(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use crate::types::IssueType;
    use std::sync::Arc;

    fn inbox(dir: &Path) -> InboxAdapter {
        let observer = Observer::new(Arc::new(MemoryStore::new()), Arc::new(Config::default()));
        InboxAdapter::new(observer, dir)
    }

    #[test]
    fn test_failed_move_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.json"), r#"{"task": "api", "success": false, "error": "429"}"#).unwrap();
        // A directory already sitting at the destination makes the rename fail.
        fs::create_dir_all(dir.path().join(PROCESSED_DIR).join("x.json")).unwrap();

        let observer = Observer::new(Arc::new(MemoryStore::new()), Arc::new(Config::default()));
        let adapter = InboxAdapter::new(observer.clone(), dir.path());
        assert!(adapter.poll().is_err());
        assert!(observer.load_outcomes().unwrap().is_empty());
        assert!(dir.path().join("x.json").is_file());
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = inbox(&dir.path().join("nope"));
        assert!(adapter.poll().unwrap().is_empty());
    }

    #[test]
    fn test_poll_ingests_and_moves_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("b.json"),
            r#"{"task": "search", "success": false, "error": "timeout after 30s"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"{"task_type": "code_gen", "success": true, "source": "ci", "ts": "2026-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let adapter = inbox(dir.path());
        let outcomes = adapter.poll().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].task_type, "code_gen");
        assert_eq!(outcomes[0].source, "ci");
        assert_eq!(outcomes[1].issue, Some(IssueType::Timeout));

        assert!(!dir.path().join("a.json").exists());
        assert!(adapter.processed_dir().join("a.json").exists());
        assert!(adapter.processed_dir().join("b.json").exists());
        assert!(dir.path().join("notes.txt").exists());

        assert!(adapter.poll().unwrap().is_empty());
    }

    #[test]
    fn test_bad_files_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        fs::write(dir.path().join(".hidden.json"), r#"{"task": "x"}"#).unwrap();
        fs::write(dir.path().join("good.json"), r#"{"task": "x", "success": true}"#).unwrap();

        let adapter = inbox(dir.path());
        let outcomes = adapter.poll().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(dir.path().join("bad.json").exists());
        assert!(dir.path().join(".hidden.json").exists());
        assert!(!dir.path().join("good.json").exists());
    }
}
