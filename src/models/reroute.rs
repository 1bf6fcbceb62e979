use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Accident,
    Construction,
    Congestion,
    Weather,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Simulated delay a delivery picks up when caught by an incident of this severity.
    pub fn delay_minutes(&self) -> i64 {
        match self {
            Severity::Low => 5,
            Severity::Medium => 15,
            Severity::High => 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficIncident {
    pub id: Uuid,
    pub location: String,
    pub kind: IncidentKind,
    pub severity: Severity,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerouteRecord {
    pub delivery_id: Uuid,
    pub original_eta: Option<DateTime<Utc>>,
    pub new_eta: DateTime<Utc>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerouteSuggestion {
    pub delivery_id: Uuid,
    pub estimated_delay_minutes: i64,
    pub reason: String,
    pub already_rerouted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerouteAdvice {
    pub suggestions: Vec<RerouteSuggestion>,
    pub rerouted: Vec<RerouteRecord>,
}
