//! # Module: observer
//!
//! Front door for outcome records. Every adapter funnels through
//! [`Observer::record`], which normalizes the record before it reaches the
//! store:
//!
//! - a success never carries an issue
//! - a failure with error text and no explicit issue is classified
//! - quality is clamped to 1–5
//!
//! Unrecognised failures are stored without an issue; the detector groups
//! them under `other`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::analysis::classifier;
use crate::config::Config;
use crate::error::Result;
use crate::store::Store;
use crate::types::{IssueType, Outcome};

/// Quality reported by [`Observer::record_simple`] for a failed task.
pub const FAILURE_QUALITY: u8 = 2;

/// Records outcomes into a [`Store`] and reads the configured window back.
#[derive(Clone)]
pub struct Observer {
    store: Arc<dyn Store>,
    config: Arc<Config>,
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Observer {
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Normalize and append one outcome. Returns the record as stored.
    pub fn record(&self, mut outcome: Outcome) -> Result<Outcome> {
        if outcome.success {
            outcome.issue = None;
        } else if outcome.issue.is_none() {
            outcome.issue = classifier::classify_outcome(&outcome);
        }
        outcome.quality = outcome.quality.map(|q| q.clamp(1, 5));

        self.store.append_outcome(&outcome)?;
        debug!(
            target: "rsi_loop::observer",
            id = %outcome.id,
            source = %outcome.source,
            task_type = %outcome.task_type,
            success = outcome.success,
            issue = outcome.issue.map(|i| i.as_str()).unwrap_or("-"),
            "outcome recorded"
        );
        Ok(outcome)
    }

    /// Record with minimal arguments. Failures report quality
    /// [`FAILURE_QUALITY`]; successes leave quality unset.
    pub fn record_simple(&self, task_type: &str, success: bool, error: Option<&str>) -> Result<Outcome> {
        let mut outcome = Outcome::new(task_type, success);
        outcome.error = error.map(str::to_string);
        if !success {
            outcome.quality = Some(FAILURE_QUALITY);
        }
        self.record(outcome)
    }

    /// Outcomes in the configured analysis window, oldest first.
    pub fn load_outcomes(&self) -> Result<Vec<Outcome>> {
        self.store.load_outcomes(self.config.analysis_window, Utc::now())
    }

    /// Failure count per issue over the window, keeping issues seen at least
    /// `threshold` times (default: the configured recurrence threshold).
    pub fn recurrences(&self, threshold: Option<u32>) -> Result<BTreeMap<IssueType, usize>> {
        let threshold = threshold.unwrap_or(self.config.recurrence_threshold) as usize;
        let mut counts: BTreeMap<IssueType, usize> = BTreeMap::new();
        for o in self.load_outcomes()?.iter().filter(|o| o.is_failure()) {
            *counts.entry(o.grouping_issue()).or_default() += 1;
        }
        counts.retain(|_, n| *n >= threshold);
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
