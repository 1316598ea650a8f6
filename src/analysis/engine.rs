//! # Stage: Analysis Engine
//!
//! ## Responsibility
//! The two entry points of the core:
//!
//! - [`run_analysis`]: classify → detect / cluster / correlate → trend →
//!   health, over one window and the previous cycle's patterns.
//! - [`plan_fixes`]: one [`Fix`] per pattern.
//!
//! [`Engine`] bundles a validated [`Config`] with both, so an invalid
//! configuration is rejected once at construction rather than per cycle.
//!
//! ## NOT Responsible For
//! - Loading the window or persisting results (see [`crate::store`])
//! - Scheduling cycles (see [`crate::cycle`])

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::{classifier, detector, health, planner};
use crate::config::Config;
use crate::error::Result;
use crate::types::{Fix, Outcome, Pattern};

/// Output of one analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub patterns: Vec<Pattern>,
    pub health: f64,
}

/// Fill in the issue of failing outcomes that arrived unclassified.
///
/// Outcomes that already carry an issue, successes, and failures without
/// error text are returned untouched.
pub fn classify_window(outcomes: &[Outcome]) -> Vec<Outcome> {
    outcomes
        .iter()
        .map(|o| {
            let mut o = o.clone();
            if o.issue.is_none() {
                o.issue = classifier::classify_outcome(&o);
            }
            o
        })
        .collect()
}

/// Run detection and scoring over one window.
///
/// Every returned pattern carries a trend relative to `previous`; pass an
/// empty slice on the first cycle and every pattern is `new`.
pub fn run_analysis(outcomes: &[Outcome], previous: &[Pattern], config: &Config) -> AnalysisReport {
    let window = classify_window(outcomes);
    let patterns = detector::detect(&window, Some(previous), config);
    let health = health::score(&window, config);

    debug!(
        target: "rsi_loop::engine",
        outcomes = window.len(),
        patterns = patterns.len(),
        health,
        "analysis complete"
    );

    AnalysisReport { patterns, health }
}

/// Plan one fix per pattern, preserving pattern order.
pub fn plan_fixes(patterns: &[Pattern], config: &Config) -> Vec<Fix> {
    patterns.iter().map(|p| planner::plan(p, config)).collect()
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A validated configuration plus the analysis entry points.
#[derive(Debug, Clone)]
pub struct Engine {
    config: Config,
}

impl Engine {
    /// Validate `config` and build an engine around it.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run_analysis(&self, outcomes: &[Outcome], previous: &[Pattern]) -> AnalysisReport {
        run_analysis(outcomes, previous, &self.config)
    }

    pub fn plan_fixes(&self, patterns: &[Pattern]) -> Vec<Fix> {
        plan_fixes(patterns, &self.config)
    }

    pub fn health(&self, outcomes: &[Outcome]) -> f64 {
        health::score(outcomes, &self.config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
