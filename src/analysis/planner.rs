//! # Stage: Fix Planner
//!
//! ## Responsibility
//! Map each surfaced pattern to one remediation. The pattern's issue is
//! looked up in a static table giving the fix category, the concrete action,
//! and a human description. Issues without an entry fall back to a manual
//! investigation.
//!
//! ## Guarantees
//! - Pure: the same pattern and config always give the same fix (including
//!   its id, `fix-<pattern id>`)
//! - A fix is `applied`/`auto` iff its category is in the configured safe set
//!   and auto-fix is enabled; otherwise `draft`/`manual`. Status never changes
//!   after planning.
//!
//! ## NOT Responsible For
//! - Persisting fixes or touching the systems they describe

use crate::config::Config;
use crate::types::{Fix, FixCategory, FixChange, FixStatus, FixType, IssueType, Pattern};

// ---------------------------------------------------------------------------
// Fix table
// ---------------------------------------------------------------------------

/// One row of the issue → remediation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixTemplate {
    pub category: FixCategory,
    pub action: &'static str,
    pub description: &'static str,
}

const fn row(category: FixCategory, action: &'static str, description: &'static str) -> FixTemplate {
    FixTemplate { category, action, description }
}

/// Template for an issue, or `None` when the issue has no mapped remediation.
pub fn template_for(issue: IssueType) -> Option<FixTemplate> {
    let t = match issue {
        IssueType::RateLimit => row(
            FixCategory::RetryLogic,
            "add/increase retry backoff",
            "Add/increase retry backoff for rate-limited endpoints",
        ),
        IssueType::ModelFallback => row(
            FixCategory::RoutingConfig,
            "update fallback chain",
            "Update model fallback chain configuration",
        ),
        IssueType::WrongModelTier => row(
            FixCategory::RoutingConfig,
            "adjust tier thresholds",
            "Adjust tier classification thresholds",
        ),
        IssueType::CostOverrun => row(
            FixCategory::RoutingConfig,
            "lower cost ceiling",
            "Lower cost ceiling or adjust model routing",
        ),
        IssueType::SlowResponse | IssueType::Timeout => row(
            FixCategory::ThresholdTuning,
            "increase timeouts",
            "Increase timeout thresholds or add circuit breaker",
        ),
        IssueType::EmptyResponse => row(
            FixCategory::RetryLogic,
            "add empty-response detection and retry",
            "Add empty-response detection and retry",
        ),
        IssueType::SessionReset => row(
            FixCategory::Investigation,
            "flag for manual investigation",
            "Investigate context management protocols",
        ),
        _ => return None,
    };
    Some(t)
}

/// Subsystem a fix of this category touches.
fn target_for(category: FixCategory) -> &'static str {
    match category {
        FixCategory::RoutingConfig => "model routing config",
        FixCategory::RetryLogic => "relevant integration code",
        FixCategory::ThresholdTuning => "relevant config",
        FixCategory::Investigation => "manual review",
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Plan the fix for one pattern.
pub fn plan(pattern: &Pattern, config: &Config) -> Fix {
    let (category, action, description) = match template_for(pattern.issue) {
        Some(t) => (t.category, t.action.to_string(), t.description.to_string()),
        None => (
            FixCategory::Investigation,
            "flag for manual investigation".to_string(),
            match &pattern.task_type {
                Some(task) => format!("Address '{}' in '{}' tasks", pattern.issue, task),
                None => format!("Address '{}' ({})", pattern.issue, pattern.category),
            },
        ),
    };

    let auto = config.auto_fix_enabled && config.is_safe(category);
    let target = target_for(category);

    Fix {
        id: format!("fix-{}", pattern.id),
        pattern_id: pattern.id.clone(),
        fix_type: if auto { FixType::Auto } else { FixType::Manual },
        status: if auto { FixStatus::Applied } else { FixStatus::Draft },
        target: target.to_string(),
        changes: vec![FixChange {
            target: target.to_string(),
            action,
            detail: format!("Detected {}x occurrences", pattern.occurrences),
        }],
        safe_category: category,
        description,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
