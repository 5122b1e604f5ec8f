//! Interval scheduler
//!
//! Triggers each registered module on its own recurring interval.
//! Intervals for different modules overlap freely; the orchestrator's
//! single-flight lock keeps any one module serial, and a `Busy` outcome
//! just skips the tick — nothing is queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

use crate::orchestrator::SyncOrchestrator;

/// One recurring schedule entry.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    /// Module to trigger.
    pub module: String,
    /// Interval between triggers.
    pub every: Duration,
}

/// Recurring-timer driver for an orchestrator.
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    entries: Vec<ScheduleEntry>,
    shutdown: Arc<AtomicBool>,
}

impl SyncScheduler {
    /// Create a scheduler with no entries.
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            orchestrator,
            entries: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Add a recurring entry.
    #[must_use]
    pub fn with_entry(mut self, module: impl Into<String>, every: Duration) -> Self {
        self.entries.push(ScheduleEntry {
            module: module.into(),
            every,
        });
        self
    }

    /// Schedule every registered module at the same interval.
    #[must_use]
    pub fn with_all_modules(mut self, every: Duration) -> Self {
        for module in self.orchestrator.modules() {
            self.entries.push(ScheduleEntry {
                module: module.to_string(),
                every,
            });
        }
        self
    }

    /// Request graceful shutdown; loops stop at their next tick.
    pub fn shutdown(&self) {
        info!("scheduler shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Run all schedule loops until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(entries = self.entries.len(), "starting sync scheduler");

        let mut handles = Vec::with_capacity(self.entries.len());
        for entry in self.entries.clone() {
            let orchestrator = Arc::clone(&self.orchestrator);
            let shutdown = Arc::clone(&self.shutdown);

            handles.push(tokio::spawn(async move {
                let mut ticker = interval(entry.every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // the first tick of a tokio interval fires immediately;
                // consume it so the first sync happens one interval in
                ticker.tick().await;

                loop {
                    ticker.tick().await;
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }

                    match orchestrator.trigger_sync(&entry.module).await {
                        Ok(outcome) if outcome.is_busy() => {
                            debug!(module = %entry.module, "previous run still in flight, skipping tick");
                        }
                        Ok(outcome) => {
                            debug!(
                                module = %entry.module,
                                run_id = ?outcome.run_id(),
                                "scheduled run finished"
                            );
                        }
                        Err(e) => {
                            error!(module = %entry.module, error = %e, "scheduled run failed");
                        }
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        info!("scheduler stopped");
    }
}
