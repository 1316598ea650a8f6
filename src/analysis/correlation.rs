//! # Stage: Correlation Engine
//!
//! ## Responsibility
//! Spot systemic problems that only become visible when several agents are
//! looked at together. For each configured `(issue_a, issue_b, name)` pair,
//! every failing `issue_a` outcome is paired with every failing `issue_b`
//! outcome from a *different* source. One or more qualifying pairs produce a
//! single high-severity `cross_source_correlation` pattern.
//!
//! Same-source co-occurrence is deliberately not counted: the
//! `(task_type, issue)` grouping already covers it.

use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::stable_id;
use crate::config::{Config, CorrelationPair};
use crate::types::{IssueType, Outcome, Pattern, PatternCategory, Severity};

/// Evaluate every configured pair against the window.
pub fn correlate(outcomes: &[Outcome], config: &Config) -> Vec<Pattern> {
    config
        .correlation_pairs
        .iter()
        .filter_map(|pair| correlate_pair(outcomes, pair))
        .collect()
}

fn failures_with<'a>(outcomes: &'a [Outcome], issue: IssueType) -> Vec<&'a Outcome> {
    outcomes
        .iter()
        .filter(|o| o.is_failure() && o.issue == Some(issue))
        .collect()
}

fn count_by_source<'a>(side: &[&'a Outcome]) -> BTreeMap<&'a str, u64> {
    let mut counts = BTreeMap::new();
    for o in side {
        *counts.entry(o.source.as_str()).or_insert(0u64) += 1;
    }
    counts
}

/// Sources on one side that have a partner from a different source on the
/// other side.
fn involved_sources(own: &BTreeMap<&str, u64>, other: &BTreeMap<&str, u64>) -> BTreeSet<String> {
    own.keys()
        .filter(|s| other.keys().any(|o| o != *s))
        .map(|s| s.to_string())
        .collect()
}

/// Evaluate one pair. `None` when no cross-source pair exists.
pub fn correlate_pair(outcomes: &[Outcome], pair: &CorrelationPair) -> Option<Pattern> {
    let side_a = failures_with(outcomes, pair.issue_a);
    let side_b = failures_with(outcomes, pair.issue_b);
    if side_a.is_empty() || side_b.is_empty() {
        return None;
    }

    let by_source_a = count_by_source(&side_a);
    let by_source_b = count_by_source(&side_b);

    // All pairs minus the same-source ones.
    let total = side_a.len() as u64 * side_b.len() as u64;
    let same_source: u64 = by_source_a
        .iter()
        .map(|(s, n)| n * by_source_b.get(s).copied().unwrap_or(0))
        .sum();
    let qualifying = total - same_source;
    if qualifying == 0 {
        return None;
    }

    let mut sources = involved_sources(&by_source_a, &by_source_b);
    sources.extend(involved_sources(&by_source_b, &by_source_a));

    let members: Vec<&Outcome> = side_a
        .iter()
        .chain(side_b.iter())
        .copied()
        .filter(|o| sources.contains(&o.source))
        .collect();
    let first_seen = members.iter().map(|o| o.timestamp).min();
    let last_seen = members.iter().map(|o| o.timestamp).max();
    let sample_errors: Vec<String> = {
        let mut seen: Vec<String> = Vec::new();
        for text in [side_a.first(), side_b.first()]
            .into_iter()
            .flatten()
            .filter_map(|o| o.error_text())
        {
            if !seen.iter().any(|s| s == text) {
                seen.push(text.to_string());
            }
        }
        seen
    };

    Some(Pattern {
        id: stable_id(
            PatternCategory::CrossSourceCorrelation,
            &format!("corr:{}:{}:{}", pair.name, pair.issue_a, pair.issue_b),
        ),
        task_type: None,
        issue: pair.issue_a,
        category: PatternCategory::CrossSourceCorrelation,
        severity: Severity::High,
        occurrences: u32::try_from(qualifying).unwrap_or(u32::MAX),
        description: format!(
            "Cross-source correlation '{}': {} and {} seen across {} sources",
            pair.name,
            pair.issue_a,
            pair.issue_b,
            sources.len()
        ),
        sources,
        suggested_action: format!("Review {} across all agent sources", pair.name.replace('_', " ")),
        trend: None,
        recurring: false,
        sample_errors,
        first_seen,
        last_seen,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
