use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::assignment::StaleReason;
use crate::models::delivery::{
    DeliveryRequest, DeliveryStatus, REQUEST_APPROVED, TrackingUpdate,
};
use crate::models::driver::{Driver, DriverStatus};
use crate::store::{ConditionalAssign, DataStore};

pub const DRIVER_ASSIGNED: &str = "Driver Assigned";

/// Switches that make the in-memory store misbehave on purpose.
#[derive(Debug, Default)]
pub struct FaultInjector {
    fail_pending_reads: AtomicBool,
    fail_driver_reads: AtomicBool,
    failing_status_updates: AtomicUsize,
    failing_driver_links: AtomicUsize,
}

impl FaultInjector {
    pub fn fail_pending_reads(&self, fail: bool) {
        self.fail_pending_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_driver_reads(&self, fail: bool) {
        self.fail_driver_reads.store(fail, Ordering::SeqCst);
    }

    /// The next `count` status updates fail.
    pub fn fail_status_updates(&self, count: usize) {
        self.failing_status_updates.store(count, Ordering::SeqCst);
    }

    /// The next `count` driver links fail.
    pub fn fail_driver_links(&self, count: usize) {
        self.failing_driver_links.store(count, Ordering::SeqCst);
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// `DashMap`-backed store used by the service binary and by tests.
///
/// Besides the `DataStore` port it carries the lifecycle operations owned by
/// intake, onboarding and operators (insert, approve, complete, decline,
/// reset).
pub struct InMemoryStore {
    deliveries: DashMap<Uuid, DeliveryRequest>,
    drivers: DashMap<Uuid, Driver>,
    conditional_assign: bool,
    pub faults: FaultInjector,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            deliveries: DashMap::new(),
            drivers: DashMap::new(),
            conditional_assign: false,
            faults: FaultInjector::default(),
        }
    }

    /// Store that advertises an atomic compare-and-swap assignment.
    pub fn with_conditional_assign() -> Self {
        Self {
            conditional_assign: true,
            ..Self::new()
        }
    }

    pub fn insert_delivery(&self, delivery: DeliveryRequest) -> DeliveryRequest {
        self.deliveries.insert(delivery.id, delivery.clone());
        delivery
    }

    pub fn insert_driver(&self, driver: Driver) -> Driver {
        self.drivers.insert(driver.id, driver.clone());
        driver
    }

    pub fn deliveries(&self) -> Vec<DeliveryRequest> {
        let mut deliveries: Vec<DeliveryRequest> = self
            .deliveries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sort_deliveries(&mut deliveries);
        deliveries
    }

    pub fn drivers(&self) -> Vec<Driver> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sort_drivers(&mut drivers);
        drivers
    }

    pub fn delivery(&self, id: Uuid) -> Option<DeliveryRequest> {
        self.deliveries.get(&id).map(|entry| entry.value().clone())
    }

    pub fn driver(&self, id: Uuid) -> Option<Driver> {
        self.drivers.get(&id).map(|entry| entry.value().clone())
    }

    pub fn approve_delivery(
        &self,
        id: Uuid,
        note: Option<String>,
    ) -> Result<DeliveryRequest, StoreError> {
        let mut delivery = self
            .deliveries
            .get_mut(&id)
            .ok_or(StoreError::NotFound { kind: "delivery", id })?;

        if !delivery.is_approved() {
            delivery
                .tracking_updates
                .push(TrackingUpdate::new(REQUEST_APPROVED, None, note));
        }

        Ok(delivery.clone())
    }

    pub fn set_driver_status(&self, id: Uuid, status: DriverStatus) -> Result<Driver, StoreError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or(StoreError::NotFound { kind: "driver", id })?;

        driver.status = status;
        driver.updated_at = Utc::now();
        Ok(driver.clone())
    }

    /// in_progress -> completed, releasing the driver.
    pub fn complete_delivery(&self, id: Uuid) -> Result<DeliveryRequest, StoreError> {
        self.close_delivery(id, DeliveryStatus::Completed, "Delivered", &[DeliveryStatus::InProgress])
    }

    /// pending|in_progress -> declined, releasing the driver if any.
    pub fn decline_delivery(&self, id: Uuid) -> Result<DeliveryRequest, StoreError> {
        self.close_delivery(
            id,
            DeliveryStatus::Declined,
            "Declined",
            &[DeliveryStatus::Pending, DeliveryStatus::InProgress],
        )
    }

    /// Manual repair: in_progress -> pending, unlinking both sides.
    pub fn reset_to_pending(&self, id: Uuid) -> Result<DeliveryRequest, StoreError> {
        self.close_delivery(
            id,
            DeliveryStatus::Pending,
            "Reset To Pending",
            &[DeliveryStatus::InProgress],
        )
    }

    /// In-progress deliveries left without a driver by a partial commit.
    pub fn find_orphaned_deliveries(&self) -> Vec<DeliveryRequest> {
        let mut orphaned: Vec<DeliveryRequest> = self
            .deliveries
            .iter()
            .filter(|entry| {
                let delivery = entry.value();
                delivery.status == DeliveryStatus::InProgress && delivery.assigned_driver.is_none()
            })
            .map(|entry| entry.value().clone())
            .collect();
        sort_deliveries(&mut orphaned);
        orphaned
    }

    fn close_delivery(
        &self,
        id: Uuid,
        to: DeliveryStatus,
        tracking_status: &str,
        allowed_from: &[DeliveryStatus],
    ) -> Result<DeliveryRequest, StoreError> {
        let mut delivery = self
            .deliveries
            .get_mut(&id)
            .ok_or(StoreError::NotFound { kind: "delivery", id })?;

        if !allowed_from.contains(&delivery.status) {
            return Err(StoreError::Rejected(format!(
                "delivery {id} is {:?}, cannot move to {to:?}",
                delivery.status
            )));
        }

        if let Some(driver_id) = delivery.assigned_driver.take() {
            if let Some(mut driver) = self.drivers.get_mut(&driver_id) {
                if driver.current_delivery == Some(id) {
                    driver.current_delivery = None;
                    driver.updated_at = Utc::now();
                }
            }
        }

        delivery.status = to;
        delivery
            .tracking_updates
            .push(TrackingUpdate::new(tracking_status, None, None));

        info!(delivery_id = %id, status = ?to, "delivery closed out");
        Ok(delivery.clone())
    }
}

fn sort_deliveries(deliveries: &mut [DeliveryRequest]) {
    deliveries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

fn sort_drivers(drivers: &mut [Driver]) {
    drivers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl DataStore for InMemoryStore {
    async fn list_pending_deliveries(&self) -> Result<Vec<DeliveryRequest>, StoreError> {
        if self.faults.fail_pending_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("pending deliveries read failed".to_string()));
        }

        let mut pending: Vec<DeliveryRequest> = self
            .deliveries
            .iter()
            .filter(|entry| entry.value().is_dispatchable())
            .map(|entry| entry.value().clone())
            .collect();
        sort_deliveries(&mut pending);
        Ok(pending)
    }

    async fn list_eligible_drivers(&self) -> Result<Vec<Driver>, StoreError> {
        if self.faults.fail_driver_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("driver read failed".to_string()));
        }

        let mut eligible: Vec<Driver> = self
            .drivers
            .iter()
            .filter(|entry| entry.value().is_eligible())
            .map(|entry| entry.value().clone())
            .collect();
        sort_drivers(&mut eligible);
        Ok(eligible)
    }

    async fn list_active_deliveries(&self) -> Result<Vec<DeliveryRequest>, StoreError> {
        let mut active: Vec<DeliveryRequest> = self
            .deliveries
            .iter()
            .filter(|entry| entry.value().status == DeliveryStatus::InProgress)
            .map(|entry| entry.value().clone())
            .collect();
        sort_deliveries(&mut active);
        Ok(active)
    }

    async fn get_delivery(&self, id: Uuid) -> Result<DeliveryRequest, StoreError> {
        self.delivery(id)
            .ok_or(StoreError::NotFound { kind: "delivery", id })
    }

    async fn get_driver(&self, id: Uuid) -> Result<Driver, StoreError> {
        self.driver(id).ok_or(StoreError::NotFound { kind: "driver", id })
    }

    async fn update_delivery_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
    ) -> Result<(), StoreError> {
        if FaultInjector::take(&self.faults.failing_status_updates) {
            return Err(StoreError::Unavailable(format!(
                "status update for delivery {id} failed"
            )));
        }

        let mut delivery = self
            .deliveries
            .get_mut(&id)
            .ok_or(StoreError::NotFound { kind: "delivery", id })?;
        delivery.status = status;
        debug!(delivery_id = %id, status = ?status, "delivery status updated");
        Ok(())
    }

    async fn assign_driver(&self, driver_id: Uuid, delivery_id: Uuid) -> Result<(), StoreError> {
        if FaultInjector::take(&self.faults.failing_driver_links) {
            return Err(StoreError::Unavailable(format!(
                "linking driver {driver_id} to delivery {delivery_id} failed"
            )));
        }

        let mut delivery = self
            .deliveries
            .get_mut(&delivery_id)
            .ok_or(StoreError::NotFound {
                kind: "delivery",
                id: delivery_id,
            })?;
        let mut driver = self.drivers.get_mut(&driver_id).ok_or(StoreError::NotFound {
            kind: "driver",
            id: driver_id,
        })?;

        driver.current_delivery = Some(delivery_id);
        driver.updated_at = Utc::now();
        delivery.assigned_driver = Some(driver_id);
        delivery.tracking_updates.push(TrackingUpdate::new(
            DRIVER_ASSIGNED,
            None,
            Some(format!("assigned to {}", driver.name)),
        ));
        Ok(())
    }

    fn supports_conditional_assign(&self) -> bool {
        self.conditional_assign
    }

    async fn conditional_assign(
        &self,
        delivery_id: Uuid,
        driver_id: Uuid,
    ) -> Result<ConditionalAssign, StoreError> {
        if !self.conditional_assign {
            return Err(StoreError::Unsupported("conditional_assign"));
        }

        // Locks are always taken delivery first, then driver.
        let Some(mut delivery) = self.deliveries.get_mut(&delivery_id) else {
            return Ok(ConditionalAssign::Rejected(StaleReason::RequestMissing));
        };
        let Some(mut driver) = self.drivers.get_mut(&driver_id) else {
            return Ok(ConditionalAssign::Rejected(StaleReason::DriverMissing));
        };

        if let Some(reason) = delivery.stale_reason().or_else(|| driver.stale_reason()) {
            warn!(delivery_id = %delivery_id, driver_id = %driver_id, reason = ?reason, "conditional assign rejected");
            return Ok(ConditionalAssign::Rejected(reason));
        }

        delivery.status = DeliveryStatus::InProgress;
        delivery.assigned_driver = Some(driver_id);
        delivery.tracking_updates.push(TrackingUpdate::new(
            DRIVER_ASSIGNED,
            None,
            Some(format!("assigned to {}", driver.name)),
        ));
        driver.current_delivery = Some(delivery_id);
        driver.updated_at = Utc::now();
        Ok(ConditionalAssign::Applied)
    }
}
