//! # Module: config
//!
//! Process-wide tunables for the analysis engine, the store and the
//! background loop.
//!
//! A [`Config`] is built once (defaults, or a TOML file layered over the
//! defaults), validated, and then only ever read. No component mutates it;
//! it is passed by reference down the call chain.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RsiError};
use crate::types::{FixCategory, IssueType};

// ---------------------------------------------------------------------------
// AnalysisWindow
// ---------------------------------------------------------------------------

/// Longest time window accepted, about a century.
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// How much history one analysis cycle looks at.
///
/// In TOML: `analysis_window = { days = 7 }`, `{ hours = 12 }` or
/// `{ records = 500 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisWindow {
    Days(u32),
    Hours(u32),
    /// The most recent N records regardless of age.
    Records(usize),
}

impl AnalysisWindow {
    /// The time span covered, or `None` for a record-count window.
    pub fn span(&self) -> Option<chrono::Duration> {
        match *self {
            AnalysisWindow::Days(d) => Some(chrono::Duration::days(i64::from(d))),
            AnalysisWindow::Hours(h) => Some(chrono::Duration::hours(i64::from(h))),
            AnalysisWindow::Records(_) => None,
        }
    }

    /// Whether a time window reaches back further than [`MAX_WINDOW_DAYS`].
    fn exceeds_max(&self) -> bool {
        match *self {
            AnalysisWindow::Days(d) => d > MAX_WINDOW_DAYS,
            AnalysisWindow::Hours(h) => u64::from(h) > u64::from(MAX_WINDOW_DAYS) * 24,
            AnalysisWindow::Records(_) => false,
        }
    }

    fn is_empty(&self) -> bool {
        match *self {
            AnalysisWindow::Days(d) | AnalysisWindow::Hours(d) => d == 0,
            AnalysisWindow::Records(n) => n == 0,
        }
    }
}

impl Default for AnalysisWindow {
    fn default() -> Self {
        AnalysisWindow::Days(7)
    }
}

// ---------------------------------------------------------------------------
// CorrelationPair
// ---------------------------------------------------------------------------

/// Two issues that, seen together from different sources, indicate one
/// systemic problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub issue_a: IssueType,
    pub issue_b: IssueType,
    pub name: String,
}

impl CorrelationPair {
    pub fn new(issue_a: IssueType, issue_b: IssueType, name: impl Into<String>) -> Self {
        Self { issue_a, issue_b, name: name.into() }
    }

    /// The four built-in pairs.
    pub fn defaults() -> Vec<CorrelationPair> {
        vec![
            CorrelationPair::new(IssueType::SessionReset, IssueType::ContextLoss, "context_management"),
            CorrelationPair::new(IssueType::CostOverrun, IssueType::WrongModelTier, "model_routing"),
            CorrelationPair::new(IssueType::EmptyResponse, IssueType::ToolError, "tool_reliability"),
            CorrelationPair::new(IssueType::HydrationFail, IssueType::ContextLoss, "session_recovery"),
        ]
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Engine, store and loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory of the on-disk store.
    pub data_dir: PathBuf,
    pub analysis_window: AnalysisWindow,
    /// Minimum occurrences before a non-high-severity group or cluster surfaces.
    pub recurrence_threshold: u32,
    /// Minimum occurrences before a high-severity group surfaces.
    pub high_severity_threshold: u32,
    /// Cap on the number of patterns a cycle reports.
    pub max_patterns: usize,
    /// Half-life of the recency weighting in the health score.
    /// `None` weights every outcome equally; in TOML, write `0`.
    #[serde(deserialize_with = "half_life_from_file")]
    pub health_half_life_hours: Option<f64>,
    pub auto_fix_enabled: bool,
    pub safe_categories: BTreeSet<FixCategory>,
    pub correlation_pairs: Vec<CorrelationPair>,
    /// Period of the background improvement loop.
    pub cycle_interval_secs: u64,
}

/// `0` in a config file switches recency weighting off.
fn half_life_from_file<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let hours = Option::<f64>::deserialize(deserializer)?;
    Ok(hours.filter(|h| *h != 0.0))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./rsi_data"),
            analysis_window: AnalysisWindow::default(),
            recurrence_threshold: 2,
            high_severity_threshold: 1,
            max_patterns: 20,
            health_half_life_hours: Some(84.0),
            auto_fix_enabled: true,
            safe_categories: [
                FixCategory::RoutingConfig,
                FixCategory::ThresholdTuning,
                FixCategory::RetryLogic,
            ]
            .into_iter()
            .collect(),
            correlation_pairs: CorrelationPair::defaults(),
            cycle_interval_secs: 3600,
        }
    }
}

impl Config {
    /// Defaults with a different store location.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Self::default() }
    }

    /// Parse a TOML document layered over the defaults, then validate.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file, then validate.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RsiError::io(path, e))?;
        Self::from_toml_str(&raw)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn is_safe(&self, category: FixCategory) -> bool {
        self.safe_categories.contains(&category)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.recurrence_threshold == 0 {
            return Err(RsiError::invalid("recurrence_threshold", "must be at least 1"));
        }
        if self.high_severity_threshold == 0 {
            return Err(RsiError::invalid("high_severity_threshold", "must be at least 1"));
        }
        if self.high_severity_threshold > self.recurrence_threshold {
            return Err(RsiError::invalid(
                "high_severity_threshold",
                format!(
                    "{} exceeds recurrence_threshold {}",
                    self.high_severity_threshold, self.recurrence_threshold
                ),
            ));
        }
        if self.analysis_window.is_empty() {
            return Err(RsiError::invalid("analysis_window", "window must not be empty"));
        }
        if self.analysis_window.exceeds_max() {
            return Err(RsiError::invalid(
                "analysis_window",
                format!("time windows are capped at {} days", MAX_WINDOW_DAYS),
            ));
        }
        if self.max_patterns == 0 {
            return Err(RsiError::invalid("max_patterns", "must be at least 1"));
        }
        if let Some(h) = self.health_half_life_hours {
            if !h.is_finite() || h <= 0.0 {
                return Err(RsiError::invalid(
                    "health_half_life_hours",
                    format!("must be a positive number of hours, got {}", h),
                ));
            }
        }
        if self.correlation_pairs.is_empty() {
            return Err(RsiError::invalid("correlation_pairs", "at least one pair is required"));
        }
        for pair in &self.correlation_pairs {
            if pair.name.trim().is_empty() {
                return Err(RsiError::invalid("correlation_pairs", "pair name must not be blank"));
            }
            if pair.issue_a == pair.issue_b {
                return Err(RsiError::invalid(
                    "correlation_pairs",
                    format!("pair '{}' correlates {} with itself", pair.name, pair.issue_a),
                ));
            }
        }
        if self.cycle_interval_secs == 0 {
            return Err(RsiError::invalid("cycle_interval_secs", "must be at least 1 second"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_default_safe_categories() {
        let c = Config::default();
        assert!(c.is_safe(FixCategory::RetryLogic));
        assert!(c.is_safe(FixCategory::RoutingConfig));
        assert!(c.is_safe(FixCategory::ThresholdTuning));
        assert!(!c.is_safe(FixCategory::Investigation));
    }

    #[test]
    fn test_default_correlation_pairs() {
        let pairs = CorrelationPair::defaults();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[0].name, "context_management");
        assert_eq!(pairs[3].issue_a, IssueType::HydrationFail);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let c = Config { recurrence_threshold: 0, ..Config::default() };
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("recurrence_threshold"));
    }

    #[test]
    fn test_high_threshold_above_recurrence_rejected() {
        let c = Config { recurrence_threshold: 2, high_severity_threshold: 3, ..Config::default() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_empty_correlation_pairs_rejected() {
        let c = Config { correlation_pairs: vec![], ..Config::default() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_self_correlating_pair_rejected() {
        let c = Config {
            correlation_pairs: vec![CorrelationPair::new(IssueType::Timeout, IssueType::Timeout, "loop")],
            ..Config::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_blank_pair_name_rejected() {
        let c = Config {
            correlation_pairs: vec![CorrelationPair::new(IssueType::Timeout, IssueType::RateLimit, " ")],
            ..Config::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_bad_half_life_rejected() {
        for h in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let c = Config { health_half_life_hours: Some(h), ..Config::default() };
            assert!(c.validate().is_err(), "half-life {} should be rejected", h);
        }
        let c = Config { health_half_life_hours: None, ..Config::default() };
        c.validate().unwrap();
    }

    #[test]
    fn test_from_toml_zero_half_life_is_unweighted() {
        let c = Config::from_toml_str("health_half_life_hours = 0").unwrap();
        assert_eq!(c.health_half_life_hours, None);
        let c = Config::from_toml_str("health_half_life_hours = 12.5").unwrap();
        assert_eq!(c.health_half_life_hours, Some(12.5));
        assert_eq!(Config::from_toml_str("").unwrap().health_half_life_hours, Some(84.0));
        assert!(Config::from_toml_str("health_half_life_hours = -3").is_err());
    }

    #[test]
    fn test_empty_window_rejected() {
        let c = Config { analysis_window: AnalysisWindow::Records(0), ..Config::default() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_oversized_window_rejected() {
        assert!(Config::from_toml_str("analysis_window = { hours = 4294967295 }").is_err());
        assert!(Config::from_toml_str("analysis_window = { days = 200000000 }").is_err());

        let at_cap = Config { analysis_window: AnalysisWindow::Days(MAX_WINDOW_DAYS), ..Config::default() };
        at_cap.validate().unwrap();
        let huge_count = Config { analysis_window: AnalysisWindow::Records(usize::MAX), ..Config::default() };
        huge_count.validate().unwrap();
    }

    #[test]
    fn test_window_span() {
        assert_eq!(AnalysisWindow::Days(2).span(), Some(chrono::Duration::hours(48)));
        assert_eq!(AnalysisWindow::Records(10).span(), None);
    }

    #[test]
    fn test_from_toml_partial_overrides_defaults() {
        let c = Config::from_toml_str(
            r#"
            recurrence_threshold = 3
            auto_fix_enabled = false
            safe_categories = ["investigation"]
            analysis_window = { records = 500 }
            "#,
        )
        .unwrap();
        assert_eq!(c.recurrence_threshold, 3);
        assert!(!c.auto_fix_enabled);
        assert!(c.is_safe(FixCategory::Investigation));
        assert!(!c.is_safe(FixCategory::RetryLogic));
        assert_eq!(c.analysis_window, AnalysisWindow::Records(500));
        assert_eq!(c.max_patterns, 20);
        assert_eq!(c.correlation_pairs.len(), 4);
    }

    #[test]
    fn test_from_toml_custom_pairs() {
        let c = Config::from_toml_str(
            r#"
            [[correlation_pairs]]
            issue_a = "timeout"
            issue_b = "rate_limit"
            name = "provider_pressure"
            "#,
        )
        .unwrap();
        assert_eq!(c.correlation_pairs.len(), 1);
        assert_eq!(c.correlation_pairs[0].issue_a, IssueType::Timeout);
    }

    #[test]
    fn test_from_toml_invalid_value_is_rejected() {
        assert!(Config::from_toml_str("recurrence_threshold = 0").is_err());
        assert!(Config::from_toml_str("recurrence_threshold = \"two\"").is_err());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Config::load(Path::new("/definitely/not/here/rsi.toml")).unwrap_err();
        assert!(matches!(err, RsiError::Io { .. }));
    }
}
