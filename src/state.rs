use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::engine::committer::AssignmentCommitter;
use crate::engine::coordinator::BatchDispatchCoordinator;
use crate::engine::matching::MatchingEngine;
use crate::engine::reroute::RerouteAdvisor;
use crate::engine::scheduler::SchedulerHandle;
use crate::models::event::DispatchEvent;
use crate::models::schedule::DispatchSettings;
use crate::observability::metrics::Metrics;
use crate::store::{InMemoryStore, SimulatedIncidentFeed};

pub struct AppState {
    pub store: Arc<InMemoryStore>,
    pub incidents: Arc<SimulatedIncidentFeed>,
    pub settings: Arc<RwLock<DispatchSettings>>,
    pub scheduler: SchedulerHandle,
    pub coordinator: Arc<BatchDispatchCoordinator>,
    pub advisor: Arc<RerouteAdvisor>,
    pub events_tx: broadcast::Sender<DispatchEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let store = if config.store_conditional_assign {
            InMemoryStore::with_conditional_assign()
        } else {
            InMemoryStore::new()
        };
        Self::with_store(config, Arc::new(store))
    }

    pub fn with_store(config: &Config, store: Arc<InMemoryStore>) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let metrics = Metrics::new();
        let incidents = Arc::new(SimulatedIncidentFeed::new());
        let settings = Arc::new(RwLock::new(config.dispatch_settings()));

        let scheduler =
            SchedulerHandle::new(config.dispatch_interval_secs, events_tx.clone(), metrics.clone());
        let committer = AssignmentCommitter::new(
            store.clone(),
            scheduler.clone(),
            events_tx.clone(),
            metrics.clone(),
        );
        let coordinator = Arc::new(BatchDispatchCoordinator::new(
            store.clone(),
            MatchingEngine::new(config.cost_model.build()),
            committer,
            settings.clone(),
            config.commit_pacing(),
            events_tx.clone(),
            metrics.clone(),
        ));
        let advisor = Arc::new(RerouteAdvisor::new(
            store.clone(),
            incidents.clone(),
            config.reroute_settings(),
            events_tx.clone(),
            metrics.clone(),
        ));

        Self {
            store,
            incidents,
            settings,
            scheduler,
            coordinator,
            advisor,
            events_tx,
            metrics,
        }
    }
}
