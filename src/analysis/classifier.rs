//! # Stage: Classifier
//!
//! ## Responsibility
//! Map free-text error messages to an [`IssueType`] using an ordered table of
//! keyword rules. The first rule with any matching keyword wins; later rules
//! are never consulted, so table order is the precedence order.
//!
//! ## Guarantees
//! - Total: any input, including empty or non-ASCII text, yields a value
//! - Deterministic: no state, no randomness
//! - Unmatched text yields `None`, never [`IssueType::Other`]
//!
//! ## NOT Responsible For
//! - Deciding whether an outcome should be classified at all (the observer
//!   and the engine only classify failures)

use crate::types::{IssueType, Outcome};

/// One keyword rule. Matching is case-insensitive; purely numeric keywords
/// (status codes) must stand alone rather than sit inside a longer number.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierRule {
    pub keywords: &'static [&'static str],
    pub issue: IssueType,
}

/// The built-in rules, in precedence order.
pub const RULES: &[ClassifierRule] = &[
    ClassifierRule {
        keywords: &["rate limit", "rate-limit", "ratelimit", "429", "too many requests", "quota exceeded"],
        issue: IssueType::RateLimit,
    },
    ClassifierRule {
        keywords: &["timeout", "timed out", "deadline exceeded"],
        issue: IssueType::Timeout,
    },
    ClassifierRule {
        keywords: &["empty response", "empty reply", "no output", "null response"],
        issue: IssueType::EmptyResponse,
    },
    ClassifierRule {
        keywords: &["context length", "token limit", "context window", "too long"],
        issue: IssueType::ContextLoss,
    },
    ClassifierRule {
        keywords: &["session reset", "session expired", "compaction"],
        issue: IssueType::SessionReset,
    },
    ClassifierRule {
        keywords: &["hydration", "rehydrat", "failed to restore"],
        issue: IssueType::HydrationFail,
    },
    ClassifierRule {
        keywords: &["cost overrun", "budget exceeded", "over budget", "cost limit", "spend limit"],
        issue: IssueType::CostOverrun,
    },
    ClassifierRule {
        keywords: &["wrong model tier", "wrong tier", "tier mismatch"],
        issue: IssueType::WrongModelTier,
    },
    ClassifierRule {
        keywords: &["model unavailable", "model not found", "fallback"],
        issue: IssueType::ModelFallback,
    },
    ClassifierRule {
        keywords: &[
            "tool error",
            "tool failed",
            "permission denied",
            "unauthorized",
            "forbidden",
            "403",
        ],
        issue: IssueType::ToolError,
    },
    ClassifierRule {
        keywords: &["not found", "404", "missing", "unknown tool"],
        issue: IssueType::MissingTool,
    },
    // Transport failures rank below missing-tool: "connection refused: host
    // not found" is a missing tool.
    ClassifierRule {
        keywords: &["connection refused", "connection reset", "network error"],
        issue: IssueType::ToolError,
    },
    ClassifierRule {
        keywords: &["slow response", "high latency"],
        issue: IssueType::SlowResponse,
    },
];

/// Classify an error message. First matching rule wins.
pub fn classify(error: &str) -> Option<IssueType> {
    let lower = error.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| keyword_matches(&lower, kw)))
        .map(|rule| rule.issue)
}

/// Classify a failing outcome from its error text. Successes, and failures
/// without error text, yield `None`.
pub fn classify_outcome(outcome: &Outcome) -> Option<IssueType> {
    if outcome.success {
        return None;
    }
    outcome.error_text().and_then(classify)
}

fn keyword_matches(haystack: &str, keyword: &str) -> bool {
    if !keyword.bytes().all(|b| b.is_ascii_digit()) {
        return haystack.contains(keyword);
    }
    // Numeric codes: "429" must not match inside "14290".
    let bytes = haystack.as_bytes();
    haystack.match_indices(keyword).any(|(start, m)| {
        let end = start + m.len();
        let before_ok = start == 0 || !bytes[start - 1].is_ascii_digit();
        let after_ok = end >= bytes.len() || !bytes[end].is_ascii_digit();
        before_ok && after_ok
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("429 Too Many Requests", IssueType::RateLimit)]
    #[case("Rate limit reached for org", IssueType::RateLimit)]
    #[case("quota exceeded for project", IssueType::RateLimit)]
    #[case("Request timed out after 30s", IssueType::Timeout)]
    #[case("DEADLINE EXCEEDED", IssueType::Timeout)]
    #[case("Got empty response from model", IssueType::EmptyResponse)]
    #[case("Context length exceeded limit", IssueType::ContextLoss)]
    #[case("session expired, please reconnect", IssueType::SessionReset)]
    #[case("hydration of session state failed", IssueType::HydrationFail)]
    #[case("daily budget exceeded", IssueType::CostOverrun)]
    #[case("tier mismatch: haiku used for planning", IssueType::WrongModelTier)]
    #[case("model unavailable, trying next", IssueType::ModelFallback)]
    #[case("Permission denied: /etc/passwd", IssueType::ToolError)]
    #[case("Connection refused", IssueType::ToolError)]
    #[case("HTTP 404 from search", IssueType::MissingTool)]
    #[case("slow response from upstream", IssueType::SlowResponse)]
    fn test_classify_rules(#[case] error: &str, #[case] expected: IssueType) {
        assert_eq!(classify(error), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("Something weird happened")]
    #[case("💥 ошибка")]
    fn test_classify_unmatched_is_none(#[case] error: &str) {
        assert_eq!(classify(error), None);
    }

    #[test]
    fn test_first_rule_wins() {
        // Matches both the model-fallback rule ("model not found") and the
        // missing-tool rule ("not found", "404"); model fallback is earlier.
        assert_eq!(classify("Model not found, got 404"), Some(IssueType::ModelFallback));
        // Rate limit precedes timeout.
        assert_eq!(classify("429 after timeout"), Some(IssueType::RateLimit));
        // Timeout precedes tool errors.
        assert_eq!(classify("connection reset: timed out"), Some(IssueType::Timeout));
        // Missing tool precedes transport failures.
        assert_eq!(classify("connection refused: host not found"), Some(IssueType::MissingTool));
        assert_eq!(classify("network error while fetching"), Some(IssueType::ToolError));
    }

    #[test]
    fn test_numeric_codes_need_boundaries() {
        assert_eq!(classify("took 14290ms"), None);
        assert_eq!(classify("status=429"), Some(IssueType::RateLimit));
        assert_eq!(classify("E403:"), Some(IssueType::ToolError));
    }

    #[test]
    fn test_rules_never_produce_other() {
        assert!(RULES.iter().all(|r| r.issue != IssueType::Other));
    }

    #[test]
    fn test_classify_outcome_skips_success() {
        let o = Outcome::success("api_call").with_error("429");
        assert_eq!(classify_outcome(&o), None);
    }

    #[test]
    fn test_classify_outcome_failure() {
        let o = Outcome::failure("api_call", "429 Too Many Requests");
        assert_eq!(classify_outcome(&o), Some(IssueType::RateLimit));
    }

    #[test]
    fn test_classify_outcome_without_error_text() {
        let mut o = Outcome::new("api_call", false);
        assert_eq!(classify_outcome(&o), None);
        o.error = Some("  ".into());
        assert_eq!(classify_outcome(&o), None);
    }
}
