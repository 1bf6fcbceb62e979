use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::assignment::StaleReason;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Active,
    Inactive,
    OffDuty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub status: DriverStatus,
    pub current_delivery: Option<Uuid>,
    pub rating: f64,
    pub vehicle_type: String,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(name: impl Into<String>, vehicle_type: impl Into<String>, rating: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: DriverStatus::Active,
            current_delivery: None,
            rating: rating.clamp(0.0, 5.0),
            vehicle_type: vehicle_type.into(),
            updated_at: Utc::now(),
        }
    }

    /// Active with no delivery in hand.
    pub fn is_eligible(&self) -> bool {
        self.status == DriverStatus::Active && self.current_delivery.is_none()
    }

    pub fn stale_reason(&self) -> Option<StaleReason> {
        if self.status != DriverStatus::Active {
            Some(StaleReason::DriverNotActive)
        } else if self.current_delivery.is_some() {
            Some(StaleReason::DriverBusy)
        } else {
            None
        }
    }
}
