//! # Module: analysis
//!
//! The pattern-detection and scoring core. Every stage is a pure,
//! synchronous function over an in-memory window of outcomes; the only
//! cross-cycle state is the previous pattern set, which the caller passes in.
//!
//! ```text
//! window ──► classifier ──► detector ◄── cluster
//!                              ▲  ◄──── correlation
//!                              │
//!                          recurrence ──► planner ──► fixes
//! window ──► health
//! ```
//!
//! ## Sub-modules
//! - [`classifier`]: error text → [`IssueType`](crate::types::IssueType)
//! - [`cluster`]: normalized-error grouping across task types
//! - [`detector`]: `(task_type, issue)` grouping, thresholds, merge
//! - [`correlation`]: configured issue pairs seen from distinct sources
//! - [`recurrence`]: trend against the previous cycle
//! - [`health`]: recency-weighted 0.0–1.0 health score
//! - [`planner`]: pattern → fix proposal
//! - [`engine`]: `run_analysis` / `plan_fixes` entry points

pub mod classifier;
pub mod cluster;
pub mod correlation;
pub mod detector;
pub mod engine;
pub mod health;
pub mod planner;
pub mod recurrence;

use sha1::{Digest, Sha1};

use crate::types::PatternCategory;

/// Content-derived pattern id: `<prefix>-<12 hex chars of sha1(key)>`.
///
/// The same grouping key always yields the same id, which is what lets the
/// recurrence tracker match patterns across cycles.
pub(crate) fn stable_id(category: PatternCategory, key: &str) -> String {
    let digest = Sha1::digest(key.as_bytes());
    let hex: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", category.id_prefix(), hex)
}

/// Order patterns by descending occurrences, then id.
pub(crate) fn sort_patterns(patterns: &mut [crate::types::Pattern]) {
    patterns.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then_with(|| a.id.cmp(&b.id)));
}
