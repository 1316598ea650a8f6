//! # Stage: Error Clusterer
//!
//! ## Responsibility
//! Catch one underlying fault that shows up across unrelated task types.
//! Failing outcomes are grouped by their *normalized* error text (ids and
//! numbers replaced with placeholders), ignoring `task_type` entirely.
//!
//! A group surfaces as an `error_cluster` pattern when it reaches the
//! recurrence threshold, whatever its task types. The one exception is a
//! group whose members all share a single task type and a single grouping
//! issue: the `(task_type, issue)` group holding them has at least as many
//! members, so it surfaces too and already reports the same evidence.
//!
//! ## Guarantees
//! - Order-independent: shuffling the input yields the same clusters
//! - Only failing outcomes with non-empty error text participate

use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::stable_id;
use crate::config::Config;
use crate::types::{IssueType, Outcome, Pattern, PatternCategory, Severity};

const MAX_NORMALIZED_LEN: usize = 120;
const MAX_DESCRIPTION_SNIPPET: usize = 60;
const MAX_SAMPLES: usize = 3;

const ID_PLACEHOLDER: &str = "<id>";
const NUM_PLACEHOLDER: &str = "<n>";

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize an error message for clustering.
///
/// Lowercases and trims, replaces UUIDs and runs of eight or more hex
/// characters with `<id>`, replaces remaining digit runs with `<n>`, and
/// truncates to 120 characters.
pub fn normalize_error(error: &str) -> String {
    let lower = error.trim().to_lowercase();
    let without_ids = replace_hex_ids(&lower);
    let without_nums = replace_digit_runs(&without_ids);
    without_nums.chars().take(MAX_NORMALIZED_LEN).collect()
}

fn is_hex(c: char) -> bool {
    c.is_ascii_digit() || ('a'..='f').contains(&c)
}

/// 8-4-4-4-12 hex groups.
fn is_uuid(token: &[char]) -> bool {
    if token.len() != 36 {
        return false;
    }
    token.iter().enumerate().all(|(i, &c)| match i {
        8 | 13 | 18 | 23 => c == '-',
        _ => is_hex(c),
    })
}

fn replace_hex_ids(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        if i + 36 <= chars.len() && is_uuid(&chars[i..i + 36]) {
            out.push_str(ID_PLACEHOLDER);
            i += 36;
            continue;
        }
        if is_hex(chars[i]) {
            let start = i;
            while i < chars.len() && is_hex(chars[i]) {
                i += 1;
            }
            if i - start >= 8 {
                out.push_str(ID_PLACEHOLDER);
            } else {
                out.extend(&chars[start..i]);
            }
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn replace_digit_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_digits = false;
    for c in s.chars() {
        if c.is_ascii_digit() {
            if !in_digits {
                out.push_str(NUM_PLACEHOLDER);
                in_digits = true;
            }
        } else {
            in_digits = false;
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

/// Accumulated members of one normalized-error group.
#[derive(Debug, Default)]
struct ClusterGroup<'a> {
    members: Vec<&'a Outcome>,
    task_types: BTreeSet<&'a str>,
    issues: BTreeSet<IssueType>,
    sources: BTreeSet<String>,
}

impl ClusterGroup<'_> {
    /// Every member falls in one `(task_type, issue)` group.
    fn covered_by_task_grouping(&self) -> bool {
        self.task_types.len() == 1 && self.issues.len() == 1
    }

    /// Most frequent member issue; declaration order breaks ties.
    fn representative_issue(&self) -> IssueType {
        let mut counts: BTreeMap<IssueType, usize> = BTreeMap::new();
        for o in &self.members {
            if let Some(issue) = o.issue {
                *counts.entry(issue).or_default() += 1;
            }
        }
        // max_by_key returns the last maximum; iterate in reverse so the
        // earliest-declared issue wins a tie.
        counts
            .into_iter()
            .rev()
            .max_by_key(|(_, n)| *n)
            .map(|(issue, _)| issue)
            .unwrap_or(IssueType::Other)
    }
}

/// Cluster failing outcomes by normalized error text.
pub fn cluster(outcomes: &[Outcome], config: &Config) -> Vec<Pattern> {
    let mut groups: BTreeMap<String, ClusterGroup<'_>> = BTreeMap::new();
    for o in outcomes.iter().filter(|o| o.is_failure()) {
        let Some(text) = o.error_text() else { continue };
        let g = groups.entry(normalize_error(text)).or_default();
        g.members.push(o);
        g.task_types.insert(o.task_type.as_str());
        g.issues.insert(o.grouping_issue());
        g.sources.insert(o.source.clone());
    }

    let threshold = config.recurrence_threshold as usize;
    groups
        .into_iter()
        .filter(|(_, g)| g.members.len() >= threshold && !g.covered_by_task_grouping())
        .map(|(normalized, g)| build_pattern(normalized, g, config))
        .collect()
}

fn build_pattern(normalized: String, group: ClusterGroup<'_>, config: &Config) -> Pattern {
    let n = group.members.len();
    let issue = group.representative_issue();
    let severity = if issue.is_high_severity() {
        Severity::High
    } else if n >= config.recurrence_threshold as usize * 2 {
        Severity::Medium
    } else {
        Severity::Low
    };

    // Samples in time order so they do not depend on input order.
    let mut by_time: Vec<&Outcome> = group.members.clone();
    by_time.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    let mut sample_errors: Vec<String> = Vec::new();
    for o in &by_time {
        if let Some(text) = o.error_text() {
            if !sample_errors.iter().any(|s| s == text) {
                sample_errors.push(text.to_string());
            }
        }
        if sample_errors.len() >= MAX_SAMPLES {
            break;
        }
    }

    let snippet: String = normalized.chars().take(MAX_DESCRIPTION_SNIPPET).collect();
    Pattern {
        id: stable_id(PatternCategory::ErrorCluster, &format!("err:{}", normalized)),
        task_type: None,
        issue,
        category: PatternCategory::ErrorCluster,
        severity,
        occurrences: n as u32,
        sources: group.sources,
        description: format!(
            "Error cluster ({}x across {} task types): {}",
            n,
            group.task_types.len(),
            snippet
        ),
        suggested_action: "Investigate common error pattern".to_string(),
        trend: None,
        recurring: false,
        sample_errors,
        first_seen: by_time.first().map(|o| o.timestamp),
        last_seen: by_time.last().map(|o| o.timestamp),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fail(task: &str, error: &str) -> Outcome {
        Outcome::failure(task, error)
    }

    #[test]
    fn test_normalize_replaces_ids_and_numbers() {
        let norm = normalize_error("Error at request abc123def456: timeout after 30s");
        assert_eq!(norm, "error at request <id>: timeout after <n>s");
    }

    #[test]
    fn test_normalize_uuid() {
        let norm = normalize_error("job 550e8400-e29b-41d4-a716-446655440000 failed");
        assert_eq!(norm, "job <id> failed");
    }

    #[test]
    fn test_normalize_short_hex_words_kept() {
        // "deadbeef" is 8 hex chars, "cafe" is only 4.
        assert_eq!(normalize_error("cafe deadbeef"), "cafe <id>");
        assert_eq!(normalize_error("Connection refused to host abc1def"), "connection refused to host abc<n>def");
    }

    #[test]
    fn test_normalize_trims_and_truncates() {
        let long = format!("  {}  ", "x".repeat(500));
        let norm = normalize_error(&long);
        assert_eq!(norm.chars().count(), MAX_NORMALIZED_LEN);
        assert!(norm.starts_with('x'));
    }

    #[test]
    fn test_normalize_non_ascii_safe() {
        let norm = normalize_error("Ошибка 42 — ß");
        assert_eq!(norm, "ошибка <n> — ß");
    }

    #[test]
    fn test_cluster_across_task_types() {
        let outcomes = vec![
            fail("search", "upstream 502 from host 10.0.0.1"),
            fail("summarize", "upstream 502 from host 10.0.0.7"),
            fail("code_gen", "upstream 503 from host 10.0.0.9"),
        ];
        let patterns = cluster(&outcomes, &Config::default());
        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.category, PatternCategory::ErrorCluster);
        assert_eq!(p.task_type, None);
        assert_eq!(p.occurrences, 3);
        assert_eq!(p.issue, IssueType::Other);
        assert!(p.description.contains("upstream <n> from host"), "{}", p.description);
        assert!(p.id.starts_with("err-"));
    }

    #[test]
    fn test_single_task_cluster_left_to_grouping() {
        let outcomes = vec![fail("api", "boom 1"), fail("api", "boom 2"), fail("api", "boom 3")];
        assert!(cluster(&outcomes, &Config::default()).is_empty());
    }

    #[test]
    fn test_single_task_cluster_with_mixed_issues_surfaces() {
        let outcomes = vec![
            fail("api", "upstream gateway 502").with_issue(IssueType::RateLimit),
            fail("api", "upstream gateway 503").with_issue(IssueType::Timeout),
        ];
        let patterns = cluster(&outcomes, &Config::default());
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].occurrences, 2);
        assert!(patterns[0].description.contains("1 task types"), "{}", patterns[0].description);
    }

    #[test]
    fn test_cluster_below_threshold_dropped() {
        let config = Config { recurrence_threshold: 3, ..Config::default() };
        let outcomes = vec![fail("a", "disk full"), fail("b", "disk full")];
        assert!(cluster(&outcomes, &config).is_empty());
    }

    #[test]
    fn test_cluster_ignores_successes_and_missing_errors() {
        let outcomes = vec![
            Outcome::success("a").with_error("disk full"),
            Outcome::new("b", false),
            fail("c", "disk full"),
        ];
        assert!(cluster(&outcomes, &Config::default()).is_empty());
    }

    #[test]
    fn test_cluster_representative_issue_and_severity() {
        let outcomes = vec![
            fail("a", "tool error 1").with_issue(IssueType::ToolError),
            fail("b", "tool error 2").with_issue(IssueType::ToolError),
            fail("c", "tool error 3"),
        ];
        let patterns = cluster(&outcomes, &Config::default());
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].issue, IssueType::ToolError);
        assert_eq!(patterns[0].severity, Severity::High);
    }

    #[test]
    fn test_representative_issue_tie_prefers_declaration_order() {
        let outcomes = vec![
            fail("a", "mixed 1").with_issue(IssueType::Timeout),
            fail("b", "mixed 2").with_issue(IssueType::RateLimit),
        ];
        let patterns = cluster(&outcomes, &Config::default());
        assert_eq!(patterns[0].issue, IssueType::RateLimit);
    }

    #[test]
    fn test_cluster_collects_sources_and_samples() {
        let outcomes = vec![
            fail("a", "oom at 1").with_source("svc_a"),
            fail("b", "oom at 2").with_source("svc_b"),
            fail("c", "oom at 3").with_source("svc_a"),
            fail("d", "oom at 4").with_source("svc_c"),
        ];
        let p = &cluster(&outcomes, &Config::default())[0];
        let sources: Vec<&str> = p.sources.iter().map(String::as_str).collect();
        assert_eq!(sources, vec!["svc_a", "svc_b", "svc_c"]);
        assert_eq!(p.sample_errors.len(), MAX_SAMPLES);
        assert_eq!(p.severity, Severity::Medium);
    }
}
