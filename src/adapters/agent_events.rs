//! Lifecycle hooks for a coding agent.
//!
//! Each hook records one outcome tagged with the adapter's source. Events that
//! are not plain task completions get a fixed `task_type` so they group
//! together (`session_management`, `model_routing`, `cron_management`,
//! `subagent_management`).

use crate::error::Result;
use crate::observer::{Observer, FAILURE_QUALITY};
use crate::types::{IssueType, Outcome};

pub const DEFAULT_AGENT_SOURCE: &str = "agent";

/// Quality reported for events that lost work outright.
const LOST_WORK_QUALITY: u8 = 1;

/// Records agent lifecycle events through an [`Observer`].
#[derive(Debug, Clone)]
pub struct AgentEventAdapter {
    observer: Observer,
    source: String,
}

impl AgentEventAdapter {
    pub fn new(observer: Observer) -> Self {
        Self::with_source(observer, DEFAULT_AGENT_SOURCE)
    }

    pub fn with_source(observer: Observer, source: impl Into<String>) -> Self {
        Self { observer, source: source.into() }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn base(&self, task_type: &str, success: bool) -> Outcome {
        Outcome::new(task_type, success).with_source(self.source.clone())
    }

    /// A task finished, successfully or not.
    pub fn on_task_complete(
        &self,
        task_type: &str,
        success: bool,
        error: Option<&str>,
        model: Option<&str>,
    ) -> Result<Outcome> {
        let mut outcome = self.base(task_type, success);
        outcome.error = error.map(str::to_string);
        outcome.model = model.map(str::to_string);
        if !success {
            outcome.quality = Some(FAILURE_QUALITY);
        }
        self.observer.record(outcome)
    }

    /// The agent's session was reset and its context lost.
    pub fn on_session_reset(&self, notes: Option<&str>) -> Result<Outcome> {
        let mut outcome = self
            .base("session_management", false)
            .with_error("Session reset: context lost")
            .with_issue(IssueType::SessionReset)
            .with_quality(LOST_WORK_QUALITY);
        if let Some(notes) = notes {
            outcome = outcome.with_metadata("notes", notes.into());
        }
        self.observer.record(outcome)
    }

    /// The requested model was unavailable and another served the task.
    ///
    /// The task completed, but degraded, so it is recorded as a failure with
    /// quality 2 and an explicit `model_fallback` issue.
    pub fn on_model_fallback(&self, from_model: &str, to_model: &str, reason: &str) -> Result<Outcome> {
        let outcome = self
            .base("model_routing", false)
            .with_error(format!("Model fallback: {} -> {} ({})", from_model, to_model, reason))
            .with_issue(IssueType::ModelFallback)
            .with_quality(FAILURE_QUALITY)
            .with_model(to_model)
            .with_metadata("from_model", from_model.into())
            .with_metadata("reason", reason.into());
        self.observer.record(outcome)
    }

    /// A scheduled job failed.
    pub fn on_cron_failure(&self, job_name: &str, error: &str) -> Result<Outcome> {
        let outcome = self
            .base("cron_management", false)
            .with_error(error)
            .with_quality(LOST_WORK_QUALITY)
            .with_metadata("job", job_name.into());
        self.observer.record(outcome)
    }

    /// A delegated sub-agent failed.
    pub fn on_subagent_failure(&self, label: &str, error: &str, model: Option<&str>) -> Result<Outcome> {
        let mut outcome = self
            .base("subagent_management", false)
            .with_error(error)
            .with_quality(LOST_WORK_QUALITY)
            .with_metadata("subagent", label.into());
        outcome.model = model.map(str::to_string);
        self.observer.record(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn adapter() -> AgentEventAdapter {
        let observer = Observer::new(Arc::new(MemoryStore::new()), Arc::new(Config::default()));
        AgentEventAdapter::with_source(observer, "coder")
    }

    #[test]
    fn test_task_complete_success() {
        let o = adapter().on_task_complete("code_review", true, None, Some("small-model")).unwrap();
        assert!(o.success);
        assert_eq!(o.source, "coder");
        assert_eq!(o.model.as_deref(), Some("small-model"));
        assert_eq!(o.quality, None);
    }

    #[test]
    fn test_task_complete_failure_is_classified() {
        let o = adapter().on_task_complete("code_review", false, Some("tool failed: git"), None).unwrap();
        assert_eq!(o.issue, Some(IssueType::ToolError));
        assert_eq!(o.quality, Some(FAILURE_QUALITY));
    }

    #[test]
    fn test_session_reset() {
        let o = adapter().on_session_reset(Some("after compaction")).unwrap();
        assert!(!o.success);
        assert_eq!(o.task_type, "session_management");
        assert_eq!(o.issue, Some(IssueType::SessionReset));
        assert_eq!(o.quality, Some(1));
        assert_eq!(o.metadata["notes"], "after compaction");
    }

    #[test]
    fn test_model_fallback_is_degraded_failure() {
        let o = adapter().on_model_fallback("large", "small", "rate limited").unwrap();
        assert!(!o.success);
        assert_eq!(o.issue, Some(IssueType::ModelFallback));
        assert_eq!(o.quality, Some(2));
        assert_eq!(o.model.as_deref(), Some("small"));
        assert_eq!(o.metadata["from_model"], "large");
    }

    #[test]
    fn test_cron_and_subagent_failures() {
        let a = adapter();
        let cron = a.on_cron_failure("nightly-digest", "job timed out").unwrap();
        assert_eq!(cron.task_type, "cron_management");
        assert_eq!(cron.issue, Some(IssueType::Timeout));
        assert_eq!(cron.metadata["job"], "nightly-digest");

        let sub = a.on_subagent_failure("researcher", "empty response", Some("m")).unwrap();
        assert_eq!(sub.task_type, "subagent_management");
        assert_eq!(sub.issue, Some(IssueType::EmptyResponse));
        assert_eq!(sub.metadata["subagent"], "researcher");
    }

    #[test]
    fn test_default_source() {
        let observer = Observer::new(Arc::new(MemoryStore::new()), Arc::new(Config::default()));
        assert_eq!(AgentEventAdapter::new(observer).source(), DEFAULT_AGENT_SOURCE);
    }
}
