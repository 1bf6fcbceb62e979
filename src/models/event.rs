use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::assignment::{Assignment, StaleReason};
use crate::models::reroute::RerouteRecord;
use crate::models::schedule::{CycleSummary, DispatchTrigger};

/// Notifications pushed to connected hosts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    AssignmentSucceeded {
        assignment: Assignment,
    },
    AssignmentSkipped {
        delivery_id: Uuid,
        driver_id: Uuid,
        reason: StaleReason,
    },
    AssignmentFailed {
        delivery_id: Uuid,
        driver_id: Uuid,
        error: String,
    },
    CycleCompleted {
        summary: CycleSummary,
    },
    CycleMissed {
        trigger: DispatchTrigger,
        error: String,
    },
    Rerouted {
        record: RerouteRecord,
    },
}
