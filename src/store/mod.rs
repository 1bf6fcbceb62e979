//! Storage ports the dispatch core runs against.
//!
//! The backing store offers independent reads and writes only. There are no
//! multi-record transactions, so every mutation the engine performs is
//! guarded by a fresh re-read (see `engine::committer`).

pub mod incidents;
pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::assignment::StaleReason;
use crate::models::delivery::{DeliveryRequest, DeliveryStatus};
use crate::models::driver::Driver;
use crate::models::reroute::TrafficIncident;

pub use incidents::SimulatedIncidentFeed;
pub use memory::InMemoryStore;

/// Result of a store-side compare-and-swap assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalAssign {
    Applied,
    Rejected(StaleReason),
}

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Pending deliveries with no driver attached.
    async fn list_pending_deliveries(&self) -> Result<Vec<DeliveryRequest>, StoreError>;

    /// Active drivers with no current delivery.
    async fn list_eligible_drivers(&self) -> Result<Vec<Driver>, StoreError>;

    /// Deliveries currently in progress.
    async fn list_active_deliveries(&self) -> Result<Vec<DeliveryRequest>, StoreError>;

    async fn get_delivery(&self, id: Uuid) -> Result<DeliveryRequest, StoreError>;

    async fn get_driver(&self, id: Uuid) -> Result<Driver, StoreError>;

    async fn update_delivery_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
    ) -> Result<(), StoreError>;

    /// Links both sides: `driver.current_delivery` and `delivery.assigned_driver`.
    async fn assign_driver(&self, driver_id: Uuid, delivery_id: Uuid) -> Result<(), StoreError>;

    /// Whether `conditional_assign` is backed by a real atomic update.
    fn supports_conditional_assign(&self) -> bool {
        false
    }

    /// Sets the delivery in progress and links the driver in one atomic step,
    /// only if both records are still eligible.
    async fn conditional_assign(
        &self,
        _delivery_id: Uuid,
        _driver_id: Uuid,
    ) -> Result<ConditionalAssign, StoreError> {
        Err(StoreError::Unsupported("conditional_assign"))
    }
}

#[async_trait]
pub trait IncidentFeed: Send + Sync {
    async fn list_traffic_incidents(&self) -> Result<Vec<TrafficIncident>, StoreError>;
}
