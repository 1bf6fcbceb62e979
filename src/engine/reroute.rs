//! Reroute decisions for in-flight deliveries under simulated incidents.
//!
//! Impact detection is a placeholder: when any incident is reported, every
//! delivery at an even position of the active list counts as affected. No
//! geometry is involved. Each delivery is rerouted at most once per session;
//! asking again hands back the record written the first time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::delivery::{DeliveryRequest, DeliveryStatus};
use crate::models::event::DispatchEvent;
use crate::models::reroute::{RerouteAdvice, RerouteRecord, RerouteSuggestion, TrafficIncident};
use crate::observability::metrics::Metrics;
use crate::store::{DataStore, IncidentFeed};

pub const MANUAL_REROUTE_REASON: &str = "manual reroute";

#[derive(Debug, Clone)]
pub struct RerouteSettings {
    pub delay_threshold_minutes: i64,
    pub automatic_rerouting: bool,
    pub eta_offset_minutes: i64,
    pub pacing: Duration,
}

impl Default for RerouteSettings {
    fn default() -> Self {
        Self {
            delay_threshold_minutes: 10,
            automatic_rerouting: false,
            eta_offset_minutes: 15,
            pacing: Duration::from_millis(500),
        }
    }
}

pub struct RerouteAdvisor {
    store: Arc<dyn DataStore>,
    feed: Arc<dyn IncidentFeed>,
    settings: RerouteSettings,
    records: DashMap<Uuid, RerouteRecord>,
    history: Mutex<Vec<RerouteRecord>>,
    events_tx: broadcast::Sender<DispatchEvent>,
    metrics: Metrics,
}

impl RerouteAdvisor {
    pub fn new(
        store: Arc<dyn DataStore>,
        feed: Arc<dyn IncidentFeed>,
        settings: RerouteSettings,
        events_tx: broadcast::Sender<DispatchEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            feed,
            settings,
            records: DashMap::new(),
            history: Mutex::new(Vec::new()),
            events_tx,
            metrics,
        }
    }

    pub fn settings(&self) -> &RerouteSettings {
        &self.settings
    }

    /// Suggests reroutes for affected deliveries whose estimated delay meets
    /// the threshold, rerouting them straight away when automatic rerouting
    /// is on.
    pub async fn advise(&self) -> Result<RerouteAdvice, StoreError> {
        let active = self.store.list_active_deliveries().await?;
        let incidents = self.feed.list_traffic_incidents().await?;

        let suggestions: Vec<RerouteSuggestion> = select_affected(&active, &incidents)
            .into_iter()
            .filter(|suggestion| {
                suggestion.estimated_delay_minutes >= self.settings.delay_threshold_minutes
            })
            .map(|mut suggestion| {
                suggestion.already_rerouted = self.records.contains_key(&suggestion.delivery_id);
                suggestion
            })
            .collect();

        info!(
            active = active.len(),
            incidents = incidents.len(),
            suggested = suggestions.len(),
            "reroute advice computed"
        );

        let rerouted = if self.settings.automatic_rerouting {
            let pending: Vec<(Uuid, String)> = suggestions
                .iter()
                .filter(|suggestion| !suggestion.already_rerouted)
                .map(|suggestion| (suggestion.delivery_id, suggestion.reason.clone()))
                .collect();
            self.reroute_many(&active, &pending).await
        } else {
            Vec::new()
        };

        Ok(RerouteAdvice {
            suggestions,
            rerouted,
        })
    }

    /// Records a reroute for `delivery`, or returns the one already on file.
    pub fn reroute(&self, delivery: &DeliveryRequest, reason: &str) -> RerouteRecord {
        match self.records.entry(delivery.id) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let record = RerouteRecord {
                    delivery_id: delivery.id,
                    original_eta: delivery.estimated_delivery,
                    new_eta: now + chrono::Duration::minutes(self.settings.eta_offset_minutes),
                    reason: reason.to_string(),
                    timestamp: now,
                };
                slot.insert(record.clone());
                self.history.lock().push(record.clone());

                self.metrics.reroutes_total.inc();
                info!(delivery_id = %delivery.id, new_eta = %record.new_eta, reason, "delivery rerouted");
                let _ = self.events_tx.send(DispatchEvent::Rerouted {
                    record: record.clone(),
                });
                record
            }
        }
    }

    /// Reroutes one delivery by id. Only in-progress deliveries qualify the
    /// first time; later calls return the stored record without a read.
    pub async fn reroute_by_id(
        &self,
        delivery_id: Uuid,
        reason: &str,
    ) -> Result<RerouteRecord, StoreError> {
        if let Some(existing) = self.record(delivery_id) {
            return Ok(existing);
        }

        let delivery = self.store.get_delivery(delivery_id).await?;
        if delivery.status != DeliveryStatus::InProgress {
            return Err(StoreError::Rejected(format!(
                "delivery {delivery_id} is {:?}, only in-progress deliveries can be rerouted",
                delivery.status
            )));
        }

        Ok(self.reroute(&delivery, reason))
    }

    /// Sequential batch with a pacing delay between writes. Failures are
    /// logged and skipped; the rest of the batch still runs.
    pub async fn reroute_batch(&self, delivery_ids: &[Uuid], reason: &str) -> Vec<RerouteRecord> {
        let mut records = Vec::with_capacity(delivery_ids.len());
        for (position, delivery_id) in delivery_ids.iter().enumerate() {
            if position > 0 && !self.settings.pacing.is_zero() {
                sleep(self.settings.pacing).await;
            }

            match self.reroute_by_id(*delivery_id, reason).await {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(delivery_id = %delivery_id, error = %err, "reroute skipped");
                }
            }
        }
        records
    }

    pub fn record(&self, delivery_id: Uuid) -> Option<RerouteRecord> {
        self.records.get(&delivery_id).map(|entry| entry.value().clone())
    }

    pub fn history(&self) -> Vec<RerouteRecord> {
        self.history.lock().clone()
    }

    async fn reroute_many(
        &self,
        active: &[DeliveryRequest],
        targets: &[(Uuid, String)],
    ) -> Vec<RerouteRecord> {
        let mut records = Vec::with_capacity(targets.len());
        for (position, (delivery_id, reason)) in targets.iter().enumerate() {
            if position > 0 && !self.settings.pacing.is_zero() {
                sleep(self.settings.pacing).await;
            }
            if let Some(delivery) = active.iter().find(|d| d.id == *delivery_id) {
                records.push(self.reroute(delivery, reason));
            }
        }
        records
    }
}

/// Deliveries at even positions, each charged the worst incident's delay.
pub fn select_affected(
    active: &[DeliveryRequest],
    incidents: &[TrafficIncident],
) -> Vec<RerouteSuggestion> {
    let Some(worst) = incidents.iter().max_by_key(|incident| incident.severity) else {
        return Vec::new();
    };

    let reason = format!(
        "{:?} ({:?}) near {}",
        worst.kind, worst.severity, worst.location
    );

    active
        .iter()
        .enumerate()
        .filter(|(position, _)| position % 2 == 0)
        .map(|(_, delivery)| RerouteSuggestion {
            delivery_id: delivery.id,
            estimated_delay_minutes: worst.severity.delay_minutes(),
            reason: reason.clone(),
            already_rerouted: false,
        })
        .collect()
}
