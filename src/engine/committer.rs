//! Read-verify-write commit of a single plan entry.
//!
//! The plan was built from a snapshot that may be stale by now, so both
//! records are re-read and re-checked before anything is written. Without a
//! conditional write in the store the commit is two independent writes:
//! status first, then the driver link. If the link fails the delivery is left
//! in progress with no driver and nothing is rolled back; an operator reset
//! repairs it. The re-read narrows the race with a concurrent cycle but does
//! not close it.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::engine::scheduler::SchedulerHandle;
use crate::error::{DispatchError, StoreError};
use crate::models::assignment::{Assignment, CommitOutcome, PlanEntry, StaleReason};
use crate::models::delivery::DeliveryStatus;
use crate::models::event::DispatchEvent;
use crate::observability::metrics::Metrics;
use crate::store::{ConditionalAssign, DataStore};

#[derive(Clone)]
pub struct AssignmentCommitter {
    store: Arc<dyn DataStore>,
    scheduler: SchedulerHandle,
    events_tx: broadcast::Sender<DispatchEvent>,
    metrics: Metrics,
}

impl AssignmentCommitter {
    pub fn new(
        store: Arc<dyn DataStore>,
        scheduler: SchedulerHandle,
        events_tx: broadcast::Sender<DispatchEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            scheduler,
            events_tx,
            metrics,
        }
    }

    pub async fn commit(
        &self,
        entry: PlanEntry,
        cycle_id: Option<Uuid>,
    ) -> Result<CommitOutcome, DispatchError> {
        let result = if self.store.supports_conditional_assign() {
            self.commit_conditional(entry, cycle_id).await
        } else {
            self.commit_two_step(entry, cycle_id).await
        };

        match &result {
            Ok(CommitOutcome::Committed(assignment)) => {
                self.scheduler.record_dispatch();
                self.metrics
                    .assignments_total
                    .with_label_values(&["committed"])
                    .inc();
                info!(
                    delivery_id = %assignment.delivery_id,
                    driver_id = %assignment.driver_id,
                    "delivery assigned"
                );
                let _ = self.events_tx.send(DispatchEvent::AssignmentSucceeded {
                    assignment: assignment.clone(),
                });
            }
            Ok(CommitOutcome::Skipped(reason)) => {
                self.metrics
                    .assignments_total
                    .with_label_values(&["skipped"])
                    .inc();
                debug!(
                    delivery_id = %entry.request_id,
                    driver_id = %entry.driver_id,
                    reason = ?reason,
                    "plan entry went stale; skipped"
                );
                let _ = self.events_tx.send(DispatchEvent::AssignmentSkipped {
                    delivery_id: entry.request_id,
                    driver_id: entry.driver_id,
                    reason: *reason,
                });
            }
            Err(err) => {
                let outcome = match err {
                    DispatchError::PartialCommit { .. } => "partial",
                    DispatchError::DriverUnavailable { .. } => "driver_unavailable",
                    _ => "error",
                };
                self.metrics
                    .assignments_total
                    .with_label_values(&[outcome])
                    .inc();
                error!(
                    delivery_id = %entry.request_id,
                    driver_id = %entry.driver_id,
                    error = %err,
                    "assignment commit failed"
                );
                let _ = self.events_tx.send(DispatchEvent::AssignmentFailed {
                    delivery_id: entry.request_id,
                    driver_id: entry.driver_id,
                    error: err.to_string(),
                });
            }
        }

        result
    }

    async fn commit_two_step(
        &self,
        entry: PlanEntry,
        cycle_id: Option<Uuid>,
    ) -> Result<CommitOutcome, DispatchError> {
        let request = match self.store.get_delivery(entry.request_id).await {
            Ok(request) => request,
            Err(StoreError::NotFound { .. }) => {
                return Ok(CommitOutcome::Skipped(StaleReason::RequestMissing));
            }
            Err(err) => return Err(err.into()),
        };
        if let Some(reason) = request.stale_reason() {
            return Ok(CommitOutcome::Skipped(reason));
        }

        let driver = match self.store.get_driver(entry.driver_id).await {
            Ok(driver) => driver,
            Err(StoreError::NotFound { .. }) => {
                return Ok(CommitOutcome::Skipped(StaleReason::DriverMissing));
            }
            Err(source) => {
                return Err(DispatchError::DriverUnavailable {
                    driver_id: entry.driver_id,
                    source,
                });
            }
        };
        if let Some(reason) = driver.stale_reason() {
            return Ok(CommitOutcome::Skipped(reason));
        }

        self.store
            .update_delivery_status(entry.request_id, DeliveryStatus::InProgress)
            .await?;

        self.store
            .assign_driver(entry.driver_id, entry.request_id)
            .await
            .map_err(|source| DispatchError::PartialCommit {
                delivery_id: entry.request_id,
                driver_id: entry.driver_id,
                source,
            })?;

        Ok(CommitOutcome::Committed(assignment(entry, cycle_id)))
    }

    async fn commit_conditional(
        &self,
        entry: PlanEntry,
        cycle_id: Option<Uuid>,
    ) -> Result<CommitOutcome, DispatchError> {
        match self
            .store
            .conditional_assign(entry.request_id, entry.driver_id)
            .await?
        {
            ConditionalAssign::Applied => Ok(CommitOutcome::Committed(assignment(entry, cycle_id))),
            ConditionalAssign::Rejected(reason) => Ok(CommitOutcome::Skipped(reason)),
        }
    }
}

fn assignment(entry: PlanEntry, cycle_id: Option<Uuid>) -> Assignment {
    Assignment {
        delivery_id: entry.request_id,
        driver_id: entry.driver_id,
        cycle_id,
        assigned_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast;
    use uuid::Uuid;

    use super::AssignmentCommitter;
    use crate::engine::scheduler::SchedulerHandle;
    use crate::error::DispatchError;
    use crate::models::assignment::{CommitOutcome, PlanEntry, StaleReason};
    use crate::models::delivery::{DeliveryRequest, DeliveryStatus, Priority};
    use crate::models::driver::{Driver, DriverStatus};
    use crate::models::event::DispatchEvent;
    use crate::observability::metrics::Metrics;
    use crate::store::{DataStore, InMemoryStore};

    struct Fixture {
        store: Arc<InMemoryStore>,
        scheduler: SchedulerHandle,
        committer: AssignmentCommitter,
        events: broadcast::Receiver<DispatchEvent>,
        entry: PlanEntry,
    }

    fn fixture(store: InMemoryStore) -> Fixture {
        let store = Arc::new(store);
        let delivery = store.insert_delivery(DeliveryRequest::new(
            Priority::Urgent,
            "organ",
            "Hospital",
            "Transplant Center",
        ));
        let driver = store.insert_driver(Driver::new("Ada", "van", 4.8));

        let metrics = Metrics::new();
        let (events_tx, events) = broadcast::channel(16);
        let scheduler = SchedulerHandle::new(60, events_tx.clone(), metrics.clone());
        let committer =
            AssignmentCommitter::new(store.clone(), scheduler.clone(), events_tx, metrics);

        Fixture {
            store,
            scheduler,
            committer,
            events,
            entry: PlanEntry {
                request_id: delivery.id,
                driver_id: driver.id,
            },
        }
    }

    #[tokio::test]
    async fn commits_and_counts() {
        let mut f = fixture(InMemoryStore::new());

        let outcome = f.committer.commit(f.entry, None).await.unwrap();

        assert!(matches!(outcome, CommitOutcome::Committed(_)));
        let delivery = f.store.delivery(f.entry.request_id).unwrap();
        assert_eq!(delivery.status, DeliveryStatus::InProgress);
        assert_eq!(delivery.assigned_driver, Some(f.entry.driver_id));
        assert_eq!(
            f.store.driver(f.entry.driver_id).unwrap().current_delivery,
            Some(f.entry.request_id)
        );
        assert_eq!(f.scheduler.cumulative_dispatch_count(), 1);
        assert!(matches!(
            f.events.try_recv().unwrap(),
            DispatchEvent::AssignmentSucceeded { .. }
        ));
    }

    #[tokio::test]
    async fn busy_driver_is_skipped_without_writes() {
        let f = fixture(InMemoryStore::new());
        let rival = f
            .store
            .insert_delivery(DeliveryRequest::new(Priority::Normal, "rx", "A", "B"));
        f.store
            .update_delivery_status(rival.id, DeliveryStatus::InProgress)
            .await
            .unwrap();
        f.store.assign_driver(f.entry.driver_id, rival.id).await.unwrap();

        let outcome = f.committer.commit(f.entry, None).await.unwrap();

        assert_eq!(outcome, CommitOutcome::Skipped(StaleReason::DriverBusy));
        assert_eq!(
            f.store.delivery(f.entry.request_id).unwrap().status,
            DeliveryStatus::Pending
        );
        assert_eq!(f.scheduler.cumulative_dispatch_count(), 0);
    }

    #[tokio::test]
    async fn inactive_driver_is_skipped() {
        let f = fixture(InMemoryStore::new());
        f.store
            .set_driver_status(f.entry.driver_id, DriverStatus::Inactive)
            .unwrap();

        let outcome = f.committer.commit(f.entry, None).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Skipped(StaleReason::DriverNotActive));
    }

    #[tokio::test]
    async fn removed_driver_is_a_driver_side_skip() {
        let f = fixture(InMemoryStore::new());
        let entry = PlanEntry {
            request_id: f.entry.request_id,
            driver_id: Uuid::new_v4(),
        };

        let outcome = f.committer.commit(entry, None).await.unwrap();

        assert_eq!(outcome, CommitOutcome::Skipped(StaleReason::DriverMissing));
        assert!(StaleReason::DriverMissing.is_driver_side());
        assert_eq!(
            f.store.delivery(f.entry.request_id).unwrap().status,
            DeliveryStatus::Pending
        );
    }

    #[tokio::test]
    async fn removed_request_is_a_request_side_skip() {
        let f = fixture(InMemoryStore::new());
        let entry = PlanEntry {
            request_id: Uuid::new_v4(),
            driver_id: f.entry.driver_id,
        };

        let outcome = f.committer.commit(entry, None).await.unwrap();

        assert_eq!(outcome, CommitOutcome::Skipped(StaleReason::RequestMissing));
        assert!(!StaleReason::RequestMissing.is_driver_side());
    }

    #[tokio::test]
    async fn already_started_request_is_skipped() {
        let f = fixture(InMemoryStore::new());
        f.store
            .update_delivery_status(f.entry.request_id, DeliveryStatus::InProgress)
            .await
            .unwrap();

        let outcome = f.committer.commit(f.entry, None).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Skipped(StaleReason::RequestNotPending));
    }

    #[tokio::test]
    async fn link_failure_leaves_visible_orphan() {
        let f = fixture(InMemoryStore::new());
        f.store.faults.fail_driver_links(1);

        let err = f.committer.commit(f.entry, None).await.unwrap_err();

        assert!(matches!(err, DispatchError::PartialCommit { .. }));
        let orphans = f.store.find_orphaned_deliveries();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, f.entry.request_id);
        assert!(f.store.driver(f.entry.driver_id).unwrap().is_eligible());
        assert_eq!(f.scheduler.cumulative_dispatch_count(), 0);
    }

    #[tokio::test]
    async fn status_failure_writes_nothing() {
        let f = fixture(InMemoryStore::new());
        f.store.faults.fail_status_updates(1);

        let err = f.committer.commit(f.entry, None).await.unwrap_err();

        assert!(matches!(err, DispatchError::Store(_)));
        assert!(f.store.find_orphaned_deliveries().is_empty());
        assert_eq!(
            f.store.delivery(f.entry.request_id).unwrap().status,
            DeliveryStatus::Pending
        );
    }

    #[tokio::test]
    async fn conditional_store_commits_atomically() {
        let f = fixture(InMemoryStore::with_conditional_assign());
        // Link faults only apply to the two-step path.
        f.store.faults.fail_driver_links(1);

        let outcome = f.committer.commit(f.entry, None).await.unwrap();

        assert!(matches!(outcome, CommitOutcome::Committed(_)));
        assert!(f.store.find_orphaned_deliveries().is_empty());
        assert_eq!(f.scheduler.cumulative_dispatch_count(), 1);
    }
}
