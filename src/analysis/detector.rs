//! # Stage: Pattern Detector
//!
//! ## Responsibility
//! Group failing outcomes by `(task_type, issue)`, grade each group's
//! severity, and surface the groups that cross their threshold. The result is
//! merged with the error clusters and cross-source correlations into one
//! ordered pattern list.
//!
//! Thresholds are asymmetric: ordinary groups need `recurrence_threshold`
//! occurrences, while high-severity issues surface at
//! `high_severity_threshold` (default 1).
//!
//! ## Guarantees
//! - Successful outcomes never contribute to any pattern
//! - Output order: descending occurrences, then id
//! - At most `max_patterns` patterns are returned
//!
//! ## NOT Responsible For
//! - Classifying raw error text (callers pre-classify; unclassified failures
//!   group under [`IssueType::Other`])

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::analysis::{cluster, correlation, recurrence, sort_patterns, stable_id};
use crate::config::Config;
use crate::types::{IssueType, Outcome, Pattern, PatternCategory, Severity};

const MAX_SAMPLES: usize = 3;

/// Severity of a `(task_type, issue)` group of `n` occurrences.
pub fn grade(issue: IssueType, n: usize, config: &Config) -> Severity {
    if issue.is_high_severity() {
        Severity::High
    } else if n >= config.recurrence_threshold as usize * 2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Whether a group of `n` occurrences with the given severity surfaces.
pub fn surfaces(severity: Severity, n: usize, config: &Config) -> bool {
    n >= config.recurrence_threshold as usize
        || (severity == Severity::High && n >= config.high_severity_threshold as usize)
}

/// `(task_type, issue)` grouping only, unsorted.
pub fn group_by_task(outcomes: &[Outcome], config: &Config) -> Vec<Pattern> {
    let mut groups: BTreeMap<(&str, IssueType), Vec<&Outcome>> = BTreeMap::new();
    for o in outcomes.iter().filter(|o| o.is_failure()) {
        groups.entry((o.task_type.as_str(), o.grouping_issue())).or_default().push(o);
    }

    let mut patterns = Vec::new();
    for ((task, issue), members) in groups {
        let n = members.len();
        let severity = grade(issue, n, config);
        if !surfaces(severity, n, config) {
            continue;
        }
        patterns.push(build_pattern(task, issue, severity, members));
    }
    patterns
}

fn build_pattern(task: &str, issue: IssueType, severity: Severity, mut members: Vec<&Outcome>) -> Pattern {
    members.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    let n = members.len();
    let sources: BTreeSet<String> = members.iter().map(|o| o.source.clone()).collect();

    let mut sample_errors: Vec<String> = Vec::new();
    for text in members.iter().filter_map(|o| o.error_text()) {
        if sample_errors.len() >= MAX_SAMPLES {
            break;
        }
        if !sample_errors.iter().any(|s| s == text) {
            sample_errors.push(text.to_string());
        }
    }

    Pattern {
        id: stable_id(PatternCategory::TaskGrouping, &format!("task:{}:{}", task, issue)),
        task_type: Some(task.to_string()),
        issue,
        category: PatternCategory::TaskGrouping,
        severity,
        occurrences: n as u32,
        description: format!(
            "In '{}' tasks, '{}' occurs {}x across {} source(s)",
            task,
            issue,
            n,
            sources.len()
        ),
        sources,
        suggested_action: issue.area().suggested_action().to_string(),
        trend: None,
        recurring: false,
        sample_errors,
        first_seen: members.first().map(|o| o.timestamp),
        last_seen: members.last().map(|o| o.timestamp),
    }
}

/// Full detection: task grouping merged with error clusters and cross-source
/// correlations, sorted, capped, and (when a previous cycle is supplied)
/// annotated with trends.
pub fn detect(outcomes: &[Outcome], previous: Option<&[Pattern]>, config: &Config) -> Vec<Pattern> {
    let grouped = group_by_task(outcomes, config);
    let clusters = cluster::cluster(outcomes, config);
    let correlations = correlation::correlate(outcomes, config);

    debug!(
        target: "rsi_loop::detector",
        outcomes = outcomes.len(),
        grouped = grouped.len(),
        clusters = clusters.len(),
        correlations = correlations.len(),
        "pattern detection complete"
    );

    let mut patterns: Vec<Pattern> = grouped
        .into_iter()
        .chain(clusters)
        .chain(correlations)
        .collect();
    sort_patterns(&mut patterns);
    patterns.truncate(config.max_patterns);

    match previous {
        Some(prev) => recurrence::tag_trend(patterns, prev),
        None => patterns,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
