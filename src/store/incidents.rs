use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::reroute::{IncidentKind, Severity, TrafficIncident};
use crate::store::IncidentFeed;

/// Hand-fed incident list standing in for a live traffic source.
#[derive(Debug, Default)]
pub struct SimulatedIncidentFeed {
    incidents: RwLock<Vec<TrafficIncident>>,
}

impl SimulatedIncidentFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(
        &self,
        location: impl Into<String>,
        kind: IncidentKind,
        severity: Severity,
    ) -> TrafficIncident {
        let incident = TrafficIncident {
            id: Uuid::new_v4(),
            location: location.into(),
            kind,
            severity,
            reported_at: Utc::now(),
        };
        self.incidents.write().push(incident.clone());
        incident
    }

    pub fn clear(&self) {
        self.incidents.write().clear();
    }
}

#[async_trait]
impl IncidentFeed for SimulatedIncidentFeed {
    async fn list_traffic_incidents(&self) -> Result<Vec<TrafficIncident>, StoreError> {
        Ok(self.incidents.read().clone())
    }
}
