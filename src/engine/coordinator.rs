use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::committer::AssignmentCommitter;
use crate::engine::matching::MatchingEngine;
use crate::engine::scheduler::CycleFn;
use crate::error::{DispatchError, StoreError};
use crate::models::assignment::{CommitOutcome, PlanEntry};
use crate::models::delivery::DeliveryRequest;
use crate::models::driver::Driver;
use crate::models::event::DispatchEvent;
use crate::models::schedule::{CycleSummary, DispatchSettings, DispatchTrigger};
use crate::observability::metrics::Metrics;
use crate::store::DataStore;

/// Last successful reads, used when a fresh read fails.
#[derive(Default)]
struct SnapshotCache {
    pending: Option<Vec<DeliveryRequest>>,
    drivers: Option<Vec<Driver>>,
}

/// Runs one dispatch cycle: snapshot, plan, then commit entries one at a time.
pub struct BatchDispatchCoordinator {
    store: Arc<dyn DataStore>,
    engine: MatchingEngine,
    committer: AssignmentCommitter,
    settings: Arc<RwLock<DispatchSettings>>,
    pacing: Duration,
    cache: Mutex<SnapshotCache>,
    events_tx: broadcast::Sender<DispatchEvent>,
    metrics: Metrics,
}

impl BatchDispatchCoordinator {
    pub fn new(
        store: Arc<dyn DataStore>,
        engine: MatchingEngine,
        committer: AssignmentCommitter,
        settings: Arc<RwLock<DispatchSettings>>,
        pacing: Duration,
        events_tx: broadcast::Sender<DispatchEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            engine,
            committer,
            settings,
            pacing,
            cache: Mutex::new(SnapshotCache::default()),
            events_tx,
            metrics,
        }
    }

    /// Adapts this coordinator into the closure the scheduler invokes.
    pub fn cycle_fn(self: &Arc<Self>) -> CycleFn {
        let coordinator = Arc::clone(self);
        Arc::new(move |trigger: DispatchTrigger| {
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.run_cycle(trigger).await }.boxed()
        })
    }

    /// Per-entry failures are counted, never returned. The only error is a
    /// snapshot that cannot be read and has no cached fallback.
    pub async fn run_cycle(&self, trigger: DispatchTrigger) -> Result<CycleSummary, DispatchError> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let timer = Instant::now();

        let (pending, drivers) = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.metrics
                    .dispatch_cycles_total
                    .with_label_values(&["missed"])
                    .inc();
                warn!(cycle_id = %cycle_id, trigger = ?trigger, error = %err, "dispatch cycle skipped");
                let _ = self.events_tx.send(DispatchEvent::CycleMissed {
                    trigger,
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        let settings = self.settings.read().clone();
        let mut queue: VecDeque<DeliveryRequest> = self.engine.prioritize(&pending).into();
        let mut pool = self.engine.eligible_pool(&drivers);

        info!(
            cycle_id = %cycle_id,
            trigger = ?trigger,
            pending = queue.len(),
            drivers = pool.len(),
            planned = queue.len().min(pool.len()),
            "dispatch cycle started"
        );

        let mut summary = CycleSummary {
            cycle_id,
            trigger,
            attempted: 0,
            committed: 0,
            skipped: 0,
            failed: 0,
            started_at,
            finished_at: started_at,
        };

        // The pool is re-derived after every commit so a driver that fails
        // its pre-check is dropped and the request it blocked gets the next one.
        while let Some(request) = queue.front() {
            let Some(index) = self.engine.pick_driver(
                request,
                &pool,
                settings.dispatch_method,
                summary.committed,
            ) else {
                break;
            };

            let entry = PlanEntry {
                request_id: request.id,
                driver_id: pool[index].id,
            };

            if summary.attempted > 0 && !self.pacing.is_zero() {
                sleep(self.pacing).await;
            }
            summary.attempted += 1;

            match self.committer.commit(entry, Some(cycle_id)).await {
                Ok(CommitOutcome::Committed(_)) => {
                    summary.committed += 1;
                    pool.remove(index);
                    queue.pop_front();
                }
                Ok(CommitOutcome::Skipped(reason)) => {
                    summary.skipped += 1;
                    if reason.is_driver_side() {
                        pool.remove(index);
                    } else {
                        queue.pop_front();
                    }
                }
                Err(DispatchError::PartialCommit { .. }) => {
                    summary.failed += 1;
                    pool.remove(index);
                    queue.pop_front();
                }
                // Nothing was written; the request stays queued for the next driver.
                Err(DispatchError::DriverUnavailable { .. }) => {
                    summary.failed += 1;
                    pool.remove(index);
                }
                Err(_) => {
                    summary.failed += 1;
                    queue.pop_front();
                }
            }
        }

        summary.finished_at = Utc::now();
        self.metrics
            .cycle_duration_seconds
            .observe(timer.elapsed().as_secs_f64());
        self.metrics
            .dispatch_cycles_total
            .with_label_values(&["completed"])
            .inc();

        info!(
            cycle_id = %cycle_id,
            attempted = summary.attempted,
            committed = summary.committed,
            skipped = summary.skipped,
            failed = summary.failed,
            "dispatch cycle finished"
        );
        let _ = self.events_tx.send(DispatchEvent::CycleCompleted {
            summary: summary.clone(),
        });

        Ok(summary)
    }

    /// The plan a cycle would start from right now. Nothing is committed.
    pub async fn preview(&self) -> Result<Vec<PlanEntry>, DispatchError> {
        let (pending, drivers) = self.snapshot().await?;
        let settings = self.settings.read().clone();
        Ok(self.engine.plan(&pending, &drivers, &settings))
    }

    async fn snapshot(&self) -> Result<(Vec<DeliveryRequest>, Vec<Driver>), DispatchError> {
        let pending = self.store.list_pending_deliveries().await;
        let drivers = self.store.list_eligible_drivers().await;

        let mut cache = self.cache.lock();
        let pending = fresh_or_cached(pending, &mut cache.pending, "pending deliveries")?;
        let drivers = fresh_or_cached(drivers, &mut cache.drivers, "eligible drivers")?;
        Ok((pending, drivers))
    }
}

fn fresh_or_cached<T: Clone>(
    read: Result<Vec<T>, StoreError>,
    cached: &mut Option<Vec<T>>,
    what: &str,
) -> Result<Vec<T>, DispatchError> {
    match read {
        Ok(rows) => {
            *cached = Some(rows.clone());
            Ok(rows)
        }
        Err(err) => match cached {
            Some(rows) => {
                warn!(error = %err, source = what, "read failed; planning from cached snapshot");
                Ok(rows.clone())
            }
            None => Err(DispatchError::DataUnavailable(format!(
                "{what}: {err} and no cached snapshot"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::fresh_or_cached;
    use crate::error::{DispatchError, StoreError};

    #[test]
    fn failed_read_falls_back_to_cache() {
        let mut cache = None;
        let rows = fresh_or_cached(Ok(vec![1, 2]), &mut cache, "rows").unwrap();
        assert_eq!(rows, vec![1, 2]);

        let rows = fresh_or_cached(
            Err(StoreError::Unavailable("down".to_string())),
            &mut cache,
            "rows",
        )
        .unwrap();
        assert_eq!(rows, vec![1, 2]);
    }

    #[test]
    fn failed_read_without_cache_is_unavailable() {
        let mut cache: Option<Vec<u8>> = None;
        let err = fresh_or_cached(
            Err(StoreError::Unavailable("down".to_string())),
            &mut cache,
            "rows",
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::DataUnavailable(_)));
    }
}
