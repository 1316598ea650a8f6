//! # Stage: Improvement Loop
//!
//! ## Responsibility
//! Drive one observe → analyze → fix cycle against a [`Store`], and
//! optionally repeat it on a fixed interval in the background.
//!
//! ```text
//! store.load_outcomes ─┐
//! store.load_patterns ─┴─► run_analysis ─► store.save_patterns
//!                                      └─► plan_fixes ─► store.save_fix (each)
//! ```
//!
//! ## Guarantees
//! - Cycles never overlap: a cycle started while another holds the cycle lock
//!   fails fast with [`RsiError::CycleInProgress`]
//! - At most one background loop runs per [`ImprovementLoop`]
//! - A failed background cycle is logged and the loop keeps its schedule
//!
//! ## NOT Responsible For
//! - Applying fixes to the systems they describe (fixes are records only)
//!
//! ## Usage
//!
//! ```rust,no_run
//! # async fn demo() -> rsi_loop::error::Result<()> {
//! use std::sync::Arc;
//! use rsi_loop::{Config, ImprovementLoop};
//!
//! let rsi = Arc::new(ImprovementLoop::open(Config::default())?);
//! rsi.observer().record_simple("code_gen", false, Some("HTTP 429"))?;
//! let report = rsi.run_cycle()?;
//! println!("health {:.2}, {} patterns", report.health, report.patterns.len());
//!
//! if let Some(handle) = rsi.start_background(rsi.config().cycle_interval()) {
//!     handle.stop().await;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::analysis::engine::Engine;
use crate::config::Config;
use crate::error::{Result, RsiError};
use crate::observer::Observer;
use crate::store::{JsonlStore, Store};
use crate::types::{Fix, Pattern};

// ---------------------------------------------------------------------------
// CycleReport
// ---------------------------------------------------------------------------

/// Result of one completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub patterns: Vec<Pattern>,
    pub fixes: Vec<Fix>,
    pub health: f64,
    /// Outcomes in the analysed window.
    pub outcomes: usize,
}

impl CycleReport {
    /// Number of fixes auto-applied this cycle.
    pub fn applied(&self) -> usize {
        self.fixes.iter().filter(|f| f.is_applied()).count()
    }
}

// ---------------------------------------------------------------------------
// ImprovementLoop
// ---------------------------------------------------------------------------

/// Serial cycle runner over a store.
pub struct ImprovementLoop {
    engine: Engine,
    observer: Observer,
    store: Arc<dyn Store>,
    cycle_lock: Mutex<()>,
    background_running: Arc<AtomicBool>,
}

impl std::fmt::Debug for ImprovementLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImprovementLoop")
            .field("engine", &self.engine)
            .field("background_running", &self.background_running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ImprovementLoop {
    /// Build a loop over `store`. Fails if `config` does not validate.
    pub fn new(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        let engine = Engine::new(config)?;
        let observer = Observer::new(Arc::clone(&store), Arc::new(engine.config().clone()));
        Ok(Self {
            engine,
            observer,
            store,
            cycle_lock: Mutex::new(()),
            background_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Build a loop over a [`JsonlStore`] at `config.data_dir`.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store = JsonlStore::open(&config.data_dir)?;
        Self::new(config, Arc::new(store))
    }

    pub fn config(&self) -> &Config {
        self.engine.config()
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run one cycle now.
    pub fn run_cycle(&self) -> Result<CycleReport> {
        let _guard = match self.cycle_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(RsiError::CycleInProgress),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        let started = Instant::now();

        let outcomes = self.observer.load_outcomes()?;
        let previous = self.store.load_patterns()?;
        let analysis = self.engine.run_analysis(&outcomes, &previous);
        self.store.save_patterns(&analysis.patterns)?;

        let fixes = self.engine.plan_fixes(&analysis.patterns);
        for fix in &fixes {
            self.store.save_fix(fix)?;
        }

        let report = CycleReport {
            patterns: analysis.patterns,
            fixes,
            health: analysis.health,
            outcomes: outcomes.len(),
        };
        info!(
            target: "rsi_loop::cycle",
            outcomes = report.outcomes,
            patterns = report.patterns.len(),
            health = report.health,
            fixes = report.fixes.len(),
            applied = report.applied(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cycle complete"
        );
        Ok(report)
    }

    /// [`run_cycle`](Self::run_cycle) on tokio's blocking pool, so the store's
    /// file I/O stays off the async workers.
    pub async fn run_cycle_async(self: &Arc<Self>) -> Result<CycleReport> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.run_cycle()).await?
    }

    /// Health of the current window.
    pub fn health_score(&self) -> Result<f64> {
        Ok(self.engine.health(&self.observer.load_outcomes()?))
    }

    /// Patterns saved by the most recent cycle.
    pub fn last_patterns(&self) -> Result<Vec<Pattern>> {
        self.store.load_patterns()
    }

    /// Every fix saved so far.
    pub fn fixes(&self) -> Result<Vec<Fix>> {
        self.store.load_fixes()
    }

    /// Whether a background loop is currently running.
    pub fn is_background_running(&self) -> bool {
        self.background_running.load(Ordering::SeqCst)
    }

    /// Start repeating cycles every `period`, the first one immediately.
    ///
    /// Returns `None` if a background loop is already running. Must be called
    /// from within a tokio runtime.
    pub fn start_background(self: &Arc<Self>, period: Duration) -> Option<LoopHandle> {
        if self
            .background_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(target: "rsi_loop::cycle", "background loop already running");
            return None;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let this = Arc::clone(self);
        let join = tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(target: "rsi_loop::cycle", period_secs = period.as_secs_f64(), "background loop started");

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticks.tick() => {
                        match this.run_cycle_async().await {
                            Ok(_) => {}
                            Err(RsiError::CycleInProgress) => {
                                debug!(target: "rsi_loop::cycle", "skipping tick, cycle in progress");
                            }
                            Err(e) => {
                                error!(target: "rsi_loop::cycle", error = %e, "background cycle failed");
                            }
                        }
                    }
                }
            }

            this.background_running.store(false, Ordering::SeqCst);
            info!(target: "rsi_loop::cycle", "background loop stopped");
        });

        Some(LoopHandle { stop_tx, join })
    }
}

/// Handle to a running background loop.
#[derive(Debug)]
pub struct LoopHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl LoopHandle {
    /// Signal the loop to stop and wait for it to finish its current cycle.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.join.await {
            error!(target: "rsi_loop::cycle", error = %e, "background loop task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{FixCategory, IssueType, Trend};

    fn memory_loop() -> ImprovementLoop {
        ImprovementLoop::new(Config::default(), Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config { recurrence_threshold: 0, ..Config::default() };
        assert!(ImprovementLoop::new(config, Arc::new(MemoryStore::new())).is_err());
    }

    #[test]
    fn test_run_cycle_persists_patterns_and_fixes() {
        let rsi = memory_loop();
        for _ in 0..3 {
            rsi.observer().record_simple("api_call", false, Some("HTTP 429")).unwrap();
        }
        let report = rsi.run_cycle().unwrap();
        assert_eq!(report.outcomes, 3);
        assert_eq!(report.patterns.len(), 1);
        assert_eq!(report.patterns[0].issue, IssueType::RateLimit);
        assert_eq!(report.applied(), 1);

        assert_eq!(rsi.last_patterns().unwrap(), report.patterns);
        let fixes = rsi.fixes().unwrap();
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].safe_category, FixCategory::RetryLogic);
    }

    #[test]
    fn test_second_cycle_sees_previous_patterns() {
        let rsi = memory_loop();
        for _ in 0..3 {
            rsi.observer().record_simple("api_call", false, Some("HTTP 429")).unwrap();
        }
        let first = rsi.run_cycle().unwrap();
        assert_eq!(first.patterns[0].trend, Some(Trend::New));

        let second = rsi.run_cycle().unwrap();
        assert_eq!(second.patterns[0].trend, Some(Trend::Stable));
        assert!(second.patterns[0].recurring);

        rsi.observer().record_simple("api_call", false, Some("HTTP 429")).unwrap();
        let third = rsi.run_cycle().unwrap();
        assert_eq!(third.patterns[0].trend, Some(Trend::Increasing));
        // Re-planning overwrites the same fix.
        assert_eq!(rsi.fixes().unwrap().len(), 1);
    }

    #[test]
    fn test_overlapping_cycle_fails_fast() {
        let rsi = memory_loop();
        let _held = rsi.cycle_lock.lock().unwrap();
        assert!(matches!(rsi.run_cycle(), Err(RsiError::CycleInProgress)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_run_cycle_async_off_runtime_thread() {
        let rsi = Arc::new(memory_loop());
        for _ in 0..2 {
            rsi.observer().record_simple("api_call", false, Some("HTTP 429")).unwrap();
        }
        let report = rsi.run_cycle_async().await.unwrap();
        assert_eq!(report.patterns.len(), 1);

        let _held = rsi.cycle_lock.lock().unwrap();
        assert!(matches!(rsi.run_cycle_async().await, Err(RsiError::CycleInProgress)));
    }

    #[test]
    fn test_health_score_of_empty_store() {
        assert_eq!(memory_loop().health_score().unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_background_loop_runs_and_stops() {
        let rsi = Arc::new(memory_loop());
        for _ in 0..2 {
            rsi.observer().record_simple("search", false, Some("request timed out")).unwrap();
        }

        let handle = rsi.start_background(Duration::from_millis(20)).unwrap();
        assert!(rsi.is_background_running());
        assert!(rsi.start_background(Duration::from_millis(20)).is_none());

        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.stop().await;

        assert!(!rsi.is_background_running());
        assert_eq!(rsi.last_patterns().unwrap().len(), 1);

        let again = rsi.start_background(Duration::from_secs(3600));
        assert!(again.is_some());
        if let Some(h) = again {
            h.stop().await;
        }
    }
}
