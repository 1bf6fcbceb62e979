//! Pure planning step: snapshot in, ordered assignment plan out.
//!
//! Requests are queued in a fixed precedence:
//! approved+urgent, approved+normal, urgent, normal. Each request then takes
//! one driver from the remaining pool according to the dispatch method.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::engine::cost::{CostModel, FlatCost, id_hash};
use crate::models::assignment::PlanEntry;
use crate::models::delivery::DeliveryRequest;
use crate::models::driver::Driver;
use crate::models::schedule::{DispatchMethod, DispatchSettings};

#[derive(Clone)]
pub struct MatchingEngine {
    cost_model: Arc<dyn CostModel>,
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(Arc::new(FlatCost))
    }
}

impl MatchingEngine {
    pub fn new(cost_model: Arc<dyn CostModel>) -> Self {
        Self { cost_model }
    }

    /// Dispatchable requests in queue order, duplicates dropped.
    ///
    /// Bucket precedence does not depend on `prioritize_urgent`.
    pub fn prioritize(&self, requests: &[DeliveryRequest]) -> Vec<DeliveryRequest> {
        let mut seen = HashSet::new();
        let mut queue: Vec<DeliveryRequest> = requests
            .iter()
            .filter(|request| request.is_dispatchable() && seen.insert(request.id))
            .cloned()
            .collect();

        // Stable sort keeps snapshot order inside a bucket.
        queue.sort_by_key(bucket);
        queue
    }

    /// Eligible drivers in snapshot order, duplicates dropped.
    pub fn eligible_pool(&self, drivers: &[Driver]) -> Vec<Driver> {
        let mut seen = HashSet::new();
        drivers
            .iter()
            .filter(|driver| driver.is_eligible() && seen.insert(driver.id))
            .cloned()
            .collect()
    }

    /// Index into `pool` of the driver `request` should get.
    pub fn pick_driver(
        &self,
        request: &DeliveryRequest,
        pool: &[Driver],
        method: DispatchMethod,
        assignments_made: usize,
    ) -> Option<usize> {
        if pool.is_empty() {
            return None;
        }

        let index = match method {
            DispatchMethod::Proximity => 0,
            DispatchMethod::Balanced => assignments_made % pool.len(),
            DispatchMethod::Efficiency => self.cheapest_from(request, pool, assignments_made),
        };
        Some(index)
    }

    pub fn plan(
        &self,
        requests: &[DeliveryRequest],
        drivers: &[Driver],
        settings: &DispatchSettings,
    ) -> Vec<PlanEntry> {
        let queue = self.prioritize(requests);
        let mut pool = self.eligible_pool(drivers);
        let mut plan = Vec::with_capacity(queue.len().min(pool.len()));

        for request in &queue {
            let Some(index) =
                self.pick_driver(request, &pool, settings.dispatch_method, plan.len())
            else {
                break;
            };

            let driver = pool.remove(index);
            plan.push(PlanEntry {
                request_id: request.id,
                driver_id: driver.id,
            });
        }

        debug!(
            requests = queue.len(),
            drivers = drivers.len(),
            planned = plan.len(),
            method = ?settings.dispatch_method,
            "assignment plan built"
        );
        plan
    }

    /// Scans the pool cyclically from the id-hash offset and keeps the
    /// strictly cheapest driver, so equal costs resolve to the offset itself.
    fn cheapest_from(
        &self,
        request: &DeliveryRequest,
        pool: &[Driver],
        assignments_made: usize,
    ) -> usize {
        let len = pool.len();
        let start = ((assignments_made as u64).wrapping_add(id_hash(&request.id)) % len as u64)
            as usize;

        let mut best = start;
        let mut best_cost = self.cost_model.cost(&pool[start], request);
        for step in 1..len {
            let index = (start + step) % len;
            let cost = self.cost_model.cost(&pool[index], request);
            if cost.total_cmp(&best_cost).is_lt() {
                best = index;
                best_cost = cost;
            }
        }
        best
    }
}

fn bucket(request: &DeliveryRequest) -> u8 {
    match (request.is_approved(), request.is_urgent()) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    }
}
