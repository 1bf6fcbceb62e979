use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::assignment::StaleReason;

/// Tracking status an operator writes when a request has been vetted.
pub const REQUEST_APPROVED: &str = "Request Approved";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InProgress,
    Completed,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingUpdate {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub location: Option<String>,
    pub note: Option<String>,
}

impl TrackingUpdate {
    pub fn new(status: impl Into<String>, location: Option<String>, note: Option<String>) -> Self {
        Self {
            status: status.into(),
            timestamp: Utc::now(),
            location,
            note,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryRequest {
    pub id: Uuid,
    pub status: DeliveryStatus,
    pub priority: Priority,
    pub assigned_driver: Option<Uuid>,
    pub package_type: String,
    pub pickup_location: String,
    pub delivery_location: String,
    pub tracking_updates: Vec<TrackingUpdate>,
    pub created_at: DateTime<Utc>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

impl DeliveryRequest {
    pub fn new(
        priority: Priority,
        package_type: impl Into<String>,
        pickup_location: impl Into<String>,
        delivery_location: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: DeliveryStatus::Pending,
            priority,
            assigned_driver: None,
            package_type: package_type.into(),
            pickup_location: pickup_location.into(),
            delivery_location: delivery_location.into(),
            tracking_updates: Vec::new(),
            created_at: Utc::now(),
            estimated_delivery: None,
        }
    }

    /// True when any tracking update carries the approval status.
    pub fn is_approved(&self) -> bool {
        self.tracking_updates
            .iter()
            .any(|update| update.status == REQUEST_APPROVED)
    }

    pub fn is_urgent(&self) -> bool {
        self.priority == Priority::Urgent
    }

    /// Pending and not linked to any driver.
    pub fn is_dispatchable(&self) -> bool {
        self.status == DeliveryStatus::Pending && self.assigned_driver.is_none()
    }

    pub fn stale_reason(&self) -> Option<StaleReason> {
        if self.status != DeliveryStatus::Pending {
            Some(StaleReason::RequestNotPending)
        } else if self.assigned_driver.is_some() {
            Some(StaleReason::RequestAlreadyAssigned)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_is_detected_anywhere_in_history() {
        let mut request = DeliveryRequest::new(Priority::Normal, "lab-sample", "A", "B");
        assert!(!request.is_approved());

        request
            .tracking_updates
            .push(TrackingUpdate::new("Request Received", None, None));
        request
            .tracking_updates
            .push(TrackingUpdate::new(REQUEST_APPROVED, None, Some("ok".to_string())));
        assert!(request.is_approved());
    }

    #[test]
    fn assigned_pending_request_is_not_dispatchable() {
        let mut request = DeliveryRequest::new(Priority::Urgent, "blood", "A", "B");
        assert!(request.is_dispatchable());

        request.assigned_driver = Some(Uuid::new_v4());
        assert!(!request.is_dispatchable());
    }
}
