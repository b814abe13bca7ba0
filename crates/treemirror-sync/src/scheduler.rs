//! Sync scheduler - drives reconcile passes on a fixed period
//!
//! The [`SyncScheduler`] owns the [`SyncConfig`] and the [`TreeComparator`]
//! and fires one pass per tick. It is an explicit resource: [`start`]
//! spawns the loop and hands back a [`SchedulerHandle`] whose
//! [`stop`](SchedulerHandle::stop) cancels and joins it, while
//! [`run_once`](SyncScheduler::run_once) runs a single pass synchronously.
//!
//! ## Timing
//!
//! ```text
//! t=0        t=I        t=2I       t=3I
//!  │ pass │   │ pass │   │ pass ...........│ pass │
//!  └──────┘   └──────┘   └────────────────┘ (tick at 3I skipped, runs late)
//! ```
//!
//! The first pass fires immediately. Later ticks fall on interval
//! boundaries measured from tick starts. Passes never overlap: the loop
//! awaits each pass before waiting for the next tick, and ticks that
//! elapsed during an overrunning pass collapse into one late tick
//! ([`MissedTickBehavior::Skip`]).
//!
//! [`start`]: SyncScheduler::start

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use treemirror_core::{
    config::SyncConfig,
    domain::{PassResult, SyncPath},
};

use crate::{engine::TreeComparator, SyncError};

// ============================================================================
// SchedulerStats
// ============================================================================

/// Pass counters shared between the scheduler loop and its handle
#[derive(Debug, Default)]
pub struct SchedulerStats {
    passes_completed: AtomicU64,
    passes_failed: AtomicU64,
}

impl SchedulerStats {
    /// Passes that ran to completion (with or without item errors)
    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::Acquire)
    }

    /// Passes skipped because a root was unavailable
    pub fn passes_failed(&self) -> u64 {
        self.passes_failed.load(Ordering::Acquire)
    }
}

// ============================================================================
// SyncScheduler
// ============================================================================

/// Runs a reconcile pass on every tick of a fixed-period timer
pub struct SyncScheduler {
    config: SyncConfig,
    source: SyncPath,
    destination: SyncPath,
    comparator: TreeComparator,
    shutdown: CancellationToken,
    stats: Arc<SchedulerStats>,
}

impl SyncScheduler {
    /// Creates a new `SyncScheduler`
    ///
    /// # Arguments
    /// * `config` - Roots and tick period
    /// * `comparator` - The pass implementation
    /// * `shutdown` - Cancelling this token stops the loop between passes
    ///
    /// # Errors
    /// Returns an error if either root is not absolute or the interval is zero
    pub fn new(
        config: SyncConfig,
        comparator: TreeComparator,
        shutdown: CancellationToken,
    ) -> Result<Self, SyncError> {
        if config.interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "interval must be greater than 0".into(),
            ));
        }

        let source = config.source()?;
        let destination = config.destination()?;

        info!(
            source = %source,
            destination = %destination,
            interval_ms = config.interval_ms,
            "Creating sync scheduler"
        );

        Ok(Self {
            config,
            source,
            destination,
            comparator,
            shutdown,
            stats: Arc::new(SchedulerStats::default()),
        })
    }

    /// Shared pass counters
    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }

    /// Runs exactly one pass and logs its outcome
    ///
    /// A pass-level failure is logged and returned, but never panics or
    /// stops a running loop; the next tick simply tries again.
    pub async fn run_once(&self) -> Result<PassResult, SyncError> {
        info!("Starting sync pass");

        match self
            .comparator
            .reconcile(&self.source, &self.destination)
            .await
        {
            Ok(result) => {
                self.stats.passes_completed.fetch_add(1, Ordering::AcqRel);

                info!(
                    copied = result.files_copied,
                    dirs_created = result.dirs_created,
                    files_deleted = result.files_deleted,
                    dirs_deleted = result.dirs_deleted,
                    errors = result.errors.len(),
                    duration_ms = result.duration_ms,
                    "Synchronization completed"
                );
                if !result.is_clean() {
                    warn!(
                        errors = result.errors.len(),
                        "Pass completed with item errors; affected entries retry next pass"
                    );
                }

                Ok(result)
            }
            Err(err) => {
                self.stats.passes_failed.fetch_add(1, Ordering::AcqRel);
                error!(error = %err, "Sync pass failed, retrying on next tick");
                Err(err)
            }
        }
    }

    /// Main loop: one pass per tick until the shutdown token is cancelled
    ///
    /// Cancellation is observed between passes; a pass already running is
    /// allowed to finish.
    pub async fn run(&self) {
        info!(interval_ms = self.config.interval_ms, "Sync scheduler starting");

        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {}
            }

            // Failures are already logged and counted by run_once.
            let _ = self.run_once().await;
        }

        info!("Sync scheduler stopped");
    }

    /// Spawns the loop on the current tokio runtime
    pub fn start(self) -> SchedulerHandle {
        let shutdown = self.shutdown.clone();
        let stats = self.stats();
        let task = tokio::spawn(async move { self.run().await });

        SchedulerHandle {
            shutdown,
            stats,
            task,
        }
    }
}

// ============================================================================
// SchedulerHandle
// ============================================================================

/// Owner of a running scheduler loop
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    stats: Arc<SchedulerStats>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Pass counters of the running loop
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the loop to exit on its own (i.e. its token was cancelled
    /// elsewhere)
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            error!(error = %err, "Sync scheduler task ended abnormally");
        }
    }

    /// Cancels the loop and waits for the pass in flight to finish
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.join().await;
    }
}

// ============================================================================
// Unit tests
// ============================================================================
