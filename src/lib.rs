//! # rsi-loop
//!
//! Failure-pattern detection, health scoring and fix proposals for AI agent
//! task outcomes.
//!
//! Agents report [`Outcome`]s (through the [`Observer`], the file inbox or the
//! webhook). Each improvement cycle reads a bounded window of outcomes, finds
//! recurring failure [`Pattern`]s, scores overall health in `[0.0, 1.0]`, and
//! plans one [`Fix`] per pattern, auto-applying the ones in a safe category.
//!
//! ```text
//! adapters ─► observer ─► store ─► cycle ─► analysis::engine ─► patterns, health, fixes
//! ```

pub mod adapters;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod cycle;
pub mod error;
pub mod observer;
pub mod store;
pub mod types;

pub use analysis::engine::{plan_fixes, run_analysis, AnalysisReport, Engine};
pub use config::{AnalysisWindow, Config, CorrelationPair};
pub use cycle::{CycleReport, ImprovementLoop, LoopHandle};
pub use error::{Result, RsiError};
pub use observer::Observer;
pub use store::{JsonlStore, MemoryStore, Store};
pub use types::{
    Fix, FixCategory, FixChange, FixStatus, FixType, IssueType, Outcome, Pattern, PatternCategory, Severity,
    Trend,
};
