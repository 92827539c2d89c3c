//! Background expiry sweep.
//!
//! The sweep is an owned job: [`ReferenceCache::start_cleanup`] returns a
//! [`CleanupHandle`] and the task runs until one of the following happens:
//!
//! - the handle is shut down or dropped
//! - the context it was started under is cancelled
//! - the cache itself is dropped (the task only holds a `Weak` reference)
//!
//! Each tick calls [`ReferenceCache::cleanup_expired`].

use ballast_core::Context;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::reference::{CleanupReport, ReferenceCache, ReferenceFetcher};

// ============================================================================
// METRICS
// ============================================================================

/// Counters for the cleanup job.
#[derive(Debug, Default)]
pub struct CleanupMetrics {
    /// Total sweep cycles completed
    pub cycles: AtomicU64,
    pub parents_removed: AtomicU64,
    pub subjects_removed: AtomicU64,
    pub characteristics_removed: AtomicU64,
}

impl CleanupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, report: &CleanupReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.parents_removed
            .fetch_add(report.parents as u64, Ordering::Relaxed);
        self.subjects_removed
            .fetch_add(report.subjects as u64, Ordering::Relaxed);
        self.characteristics_removed
            .fetch_add(report.characteristics as u64, Ordering::Relaxed);
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> CleanupSnapshot {
        CleanupSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            parents_removed: self.parents_removed.load(Ordering::Relaxed),
            subjects_removed: self.subjects_removed.load(Ordering::Relaxed),
            characteristics_removed: self.characteristics_removed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of cleanup metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSnapshot {
    pub cycles: u64,
    pub parents_removed: u64,
    pub subjects_removed: u64,
    pub characteristics_removed: u64,
}

impl CleanupSnapshot {
    pub fn total_removed(&self) -> u64 {
        self.parents_removed + self.subjects_removed + self.characteristics_removed
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// Owner of a running cleanup job. Dropping it stops the job.
#[derive(Debug)]
pub struct CleanupHandle {
    ctx: Context,
    metrics: Arc<CleanupMetrics>,
    join: Option<JoinHandle<()>>,
}

impl CleanupHandle {
    /// Live view of the job's counters.
    pub fn metrics(&self) -> CleanupSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the job and wait for it to exit.
    pub async fn shutdown(mut self) -> CleanupSnapshot {
        self.ctx.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "Cache cleanup task did not exit cleanly");
            }
        }
        self.metrics.snapshot()
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.ctx.cancel();
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

impl<F: ReferenceFetcher> ReferenceCache<F> {
    /// Sweep expired entries every `every`, detached from any caller context.
    pub fn start_cleanup(self: &Arc<Self>, every: Duration) -> CleanupHandle {
        self.start_cleanup_in(&Context::background(), every)
    }

    /// Sweep expired entries every `every` until `parent` is cancelled or the
    /// returned handle goes away.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_cleanup_in(self: &Arc<Self>, parent: &Context, every: Duration) -> CleanupHandle {
        let ctx = parent.child();
        let metrics = Arc::new(CleanupMetrics::new());
        let join = tokio::spawn(cache_cleanup_task(
            Arc::downgrade(self),
            every,
            ctx.clone(),
            metrics.clone(),
        ));
        CleanupHandle {
            ctx,
            metrics,
            join: Some(join),
        }
    }
}

async fn cache_cleanup_task<F: ReferenceFetcher>(
    cache: Weak<ReferenceCache<F>>,
    every: Duration,
    ctx: Context,
    metrics: Arc<CleanupMetrics>,
) {
    let mut ticker = interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; nothing can have expired yet.
    ticker.tick().await;

    tracing::info!(interval_ms = every.as_millis() as u64, "Cache cleanup task started");

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancelled() => {
                tracing::info!("Cache cleanup task shutting down");
                break;
            }

            _ = ticker.tick() => {
                let Some(cache) = cache.upgrade() else {
                    tracing::info!("Cache dropped, cleanup task exiting");
                    break;
                };
                let report = cache.cleanup_expired();
                metrics.record(&report);
                if report.total() > 0 {
                    tracing::debug!(
                        parents = report.parents,
                        subjects = report.subjects,
                        characteristics = report.characteristics,
                        "Cache cleanup cycle completed"
                    );
                } else {
                    tracing::trace!("Cache cleanup cycle completed with nothing expired");
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        removed = snapshot.total_removed(),
        "Cache cleanup task completed"
    );
}
