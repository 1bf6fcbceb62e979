use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One proposed pairing produced by the matching engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanEntry {
    pub request_id: Uuid,
    pub driver_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub delivery_id: Uuid,
    pub driver_id: Uuid,
    pub cycle_id: Option<Uuid>,
    pub assigned_at: DateTime<Utc>,
}

/// Why a pre-check refused to commit an entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    RequestNotPending,
    RequestAlreadyAssigned,
    DriverNotActive,
    DriverBusy,
    RequestMissing,
    DriverMissing,
}

impl StaleReason {
    /// The driver, not the request, was the reason the entry went stale.
    pub fn is_driver_side(&self) -> bool {
        matches!(
            self,
            StaleReason::DriverNotActive | StaleReason::DriverBusy | StaleReason::DriverMissing
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(Assignment),
    Skipped(StaleReason),
}
