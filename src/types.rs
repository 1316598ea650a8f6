//! # Module: types
//!
//! Records that flow through the analysis pipeline: the observed [`Outcome`],
//! the surfaced [`Pattern`], and the proposed [`Fix`], plus the closed
//! vocabularies they are built from.
//!
//! Every enum serializes as a `snake_case` string so persisted JSON stays
//! readable and stable across releases.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// IssueType
// ---------------------------------------------------------------------------

/// A classified category of task failure.
///
/// Declaration order is significant: it breaks ties wherever a single
/// representative issue has to be chosen from several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    // Model / routing
    RateLimit,
    ModelFallback,
    WrongModelTier,
    CostOverrun,
    BadRouting,
    SlowResponse,
    // Tool / execution
    ToolError,
    EmptyResponse,
    MissingTool,
    IncompleteTask,
    // Output quality
    WrongOutput,
    // Memory / context
    ContextLoss,
    MemoryMiss,
    CompactionLostContext,
    SessionReset,
    HydrationFail,
    // Self-governance
    OverConfirmation,
    RepeatedMistake,
    SkillGap,
    WalMiss,
    Timeout,
    /// Catch-all for failures no rule recognised. Never produced by the classifier.
    Other,
}

impl IssueType {
    /// Every issue type, in declaration order.
    pub const ALL: [IssueType; 22] = [
        IssueType::RateLimit,
        IssueType::ModelFallback,
        IssueType::WrongModelTier,
        IssueType::CostOverrun,
        IssueType::BadRouting,
        IssueType::SlowResponse,
        IssueType::ToolError,
        IssueType::EmptyResponse,
        IssueType::MissingTool,
        IssueType::IncompleteTask,
        IssueType::WrongOutput,
        IssueType::ContextLoss,
        IssueType::MemoryMiss,
        IssueType::CompactionLostContext,
        IssueType::SessionReset,
        IssueType::HydrationFail,
        IssueType::OverConfirmation,
        IssueType::RepeatedMistake,
        IssueType::SkillGap,
        IssueType::WalMiss,
        IssueType::Timeout,
        IssueType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::RateLimit => "rate_limit",
            IssueType::ModelFallback => "model_fallback",
            IssueType::WrongModelTier => "wrong_model_tier",
            IssueType::CostOverrun => "cost_overrun",
            IssueType::BadRouting => "bad_routing",
            IssueType::SlowResponse => "slow_response",
            IssueType::ToolError => "tool_error",
            IssueType::EmptyResponse => "empty_response",
            IssueType::MissingTool => "missing_tool",
            IssueType::IncompleteTask => "incomplete_task",
            IssueType::WrongOutput => "wrong_output",
            IssueType::ContextLoss => "context_loss",
            IssueType::MemoryMiss => "memory_miss",
            IssueType::CompactionLostContext => "compaction_lost_context",
            IssueType::SessionReset => "session_reset",
            IssueType::HydrationFail => "hydration_fail",
            IssueType::OverConfirmation => "over_confirmation",
            IssueType::RepeatedMistake => "repeated_mistake",
            IssueType::SkillGap => "skill_gap",
            IssueType::WalMiss => "wal_miss",
            IssueType::Timeout => "timeout",
            IssueType::Other => "other",
        }
    }

    /// Issues costly enough to surface on their first occurrence.
    pub fn is_high_severity(&self) -> bool {
        matches!(
            self,
            IssueType::ContextLoss
                | IssueType::HydrationFail
                | IssueType::SessionReset
                | IssueType::ToolError
                | IssueType::EmptyResponse
                | IssueType::CostOverrun
                | IssueType::WrongOutput
                | IssueType::WalMiss
        )
    }

    /// The subsystem this issue points at.
    pub fn area(&self) -> ProblemArea {
        match self {
            IssueType::SkillGap | IssueType::MissingTool | IssueType::WrongOutput => {
                ProblemArea::SkillGap
            }
            IssueType::RateLimit
            | IssueType::ModelFallback
            | IssueType::WrongModelTier
            | IssueType::SlowResponse
            | IssueType::CostOverrun => ProblemArea::ModelRouting,
            IssueType::ContextLoss
            | IssueType::MemoryMiss
            | IssueType::CompactionLostContext
            | IssueType::SessionReset
            | IssueType::HydrationFail => ProblemArea::MemoryContinuity,
            IssueType::RepeatedMistake | IssueType::OverConfirmation | IssueType::BadRouting => {
                ProblemArea::BehaviorPattern
            }
            IssueType::ToolError | IssueType::Timeout | IssueType::EmptyResponse => {
                ProblemArea::ToolReliability
            }
            IssueType::IncompleteTask | IssueType::WalMiss | IssueType::Other => ProblemArea::Other,
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        IssueType::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == wanted)
            .ok_or_else(|| format!("unknown issue type: {}", s))
    }
}

// ---------------------------------------------------------------------------
// ProblemArea
// ---------------------------------------------------------------------------

/// Coarse grouping of issue types by the part of the agent that needs work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemArea {
    SkillGap,
    ModelRouting,
    MemoryContinuity,
    BehaviorPattern,
    ToolReliability,
    Other,
}

impl ProblemArea {
    pub fn suggested_action(&self) -> &'static str {
        match self {
            ProblemArea::SkillGap => "Create or improve relevant skill/tool",
            ProblemArea::ModelRouting => "Update model routing configuration",
            ProblemArea::MemoryContinuity => "Improve memory and context protocols",
            ProblemArea::BehaviorPattern => "Update agent behavior rules",
            ProblemArea::ToolReliability => "Add retry logic or fallback tools",
            ProblemArea::Other => "Investigate and address",
        }
    }
}

// ---------------------------------------------------------------------------
// Pattern vocabulary
// ---------------------------------------------------------------------------

/// How urgently a pattern needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Which detector surfaced a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    TaskGrouping,
    ErrorCluster,
    CrossSourceCorrelation,
}

impl PatternCategory {
    /// Short prefix used in pattern ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            PatternCategory::TaskGrouping => "task",
            PatternCategory::ErrorCluster => "err",
            PatternCategory::CrossSourceCorrelation => "corr",
        }
    }
}

impl std::fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternCategory::TaskGrouping => write!(f, "task_grouping"),
            PatternCategory::ErrorCluster => write!(f, "error_cluster"),
            PatternCategory::CrossSourceCorrelation => write!(f, "cross_source_correlation"),
        }
    }
}

/// Movement of a pattern relative to the previous cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    New,
    Increasing,
    Stable,
    Decreasing,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::New => write!(f, "new"),
            Trend::Increasing => write!(f, "increasing"),
            Trend::Stable => write!(f, "stable"),
            Trend::Decreasing => write!(f, "decreasing"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fix vocabulary
// ---------------------------------------------------------------------------

/// Kind of remediation a fix belongs to. Membership in the configured safe
/// set decides whether a fix may be auto-applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixCategory {
    RetryLogic,
    RoutingConfig,
    ThresholdTuning,
    Investigation,
}

impl FixCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixCategory::RetryLogic => "retry_logic",
            FixCategory::RoutingConfig => "routing_config",
            FixCategory::ThresholdTuning => "threshold_tuning",
            FixCategory::Investigation => "investigation",
        }
    }
}

impl std::fmt::Display for FixCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FixCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "retry_logic" => Ok(FixCategory::RetryLogic),
            "routing_config" => Ok(FixCategory::RoutingConfig),
            "threshold_tuning" => Ok(FixCategory::ThresholdTuning),
            "investigation" => Ok(FixCategory::Investigation),
            other => Err(format!("unknown fix category: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixType {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    Draft,
    Applied,
}

impl std::fmt::Display for FixStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixStatus::Draft => write!(f, "draft"),
            FixStatus::Applied => write!(f, "applied"),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

pub const DEFAULT_SOURCE: &str = "generic";

fn new_outcome_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

fn default_task_type() -> String {
    "unknown".to_string()
}

fn default_success() -> bool {
    true
}

/// One observed task execution.
///
/// Outcomes are immutable once recorded; the store owns them. Field aliases
/// accept the looser key names that agents drop into the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(default = "new_outcome_id")]
    pub id: String,
    #[serde(default = "Utc::now", alias = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_task_type", alias = "task")]
    pub task_type: String,
    #[serde(default = "default_success")]
    pub success: bool,
    /// Self-reported quality, 1 (worst) to 5 (best).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(
        default,
        alias = "error_message",
        alias = "error_msg",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<IssueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Outcome {
    /// A fresh outcome stamped now, from the generic source.
    pub fn new(task_type: impl Into<String>, success: bool) -> Self {
        Self {
            id: new_outcome_id(),
            timestamp: Utc::now(),
            source: default_source(),
            task_type: task_type.into(),
            success,
            quality: None,
            error: None,
            issue: None,
            model: None,
            duration_secs: None,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn success(task_type: impl Into<String>) -> Self {
        Self::new(task_type, true)
    }

    pub fn failure(task_type: impl Into<String>, error: impl Into<String>) -> Self {
        let mut o = Self::new(task_type, false);
        o.error = Some(error.into());
        o
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_issue(mut self, issue: IssueType) -> Self {
        self.issue = Some(issue);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_duration_secs(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_failure(&self) -> bool {
        !self.success
    }

    /// The issue a failing outcome is grouped under: its own, or
    /// [`IssueType::Other`] when nothing classified it.
    pub fn grouping_issue(&self) -> IssueType {
        self.issue.unwrap_or(IssueType::Other)
    }

    /// Non-empty error text, if any.
    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// A recurring condition surfaced from a window of outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Content-derived id; identical grouping keys give identical ids across cycles.
    pub id: String,
    /// `None` for cross-task clusters and correlations.
    pub task_type: Option<String>,
    pub issue: IssueType,
    pub category: PatternCategory,
    pub severity: Severity,
    pub occurrences: u32,
    pub sources: BTreeSet<String>,
    pub description: String,
    pub suggested_action: String,
    #[serde(default)]
    pub trend: Option<Trend>,
    /// Set when the same id was present in the previous cycle.
    #[serde(default)]
    pub recurring: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Fix
// ---------------------------------------------------------------------------

/// One concrete edit within a fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixChange {
    pub target: String,
    pub action: String,
    pub detail: String,
}

/// A remediation proposed (or auto-applied) for one pattern.
///
/// `status` is decided once when the fix is planned and never transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub id: String,
    /// Id of the pattern this fix addresses. The pattern is not owned.
    pub pattern_id: String,
    #[serde(rename = "type")]
    pub fix_type: FixType,
    pub status: FixStatus,
    pub target: String,
    pub changes: Vec<FixChange>,
    pub safe_category: FixCategory,
    pub description: String,
}

impl Fix {
    pub fn is_applied(&self) -> bool {
        self.status == FixStatus::Applied
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
