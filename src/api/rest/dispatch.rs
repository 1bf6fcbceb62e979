use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::assignment::PlanEntry;
use crate::models::delivery::DeliveryRequest;
use crate::models::schedule::{CycleSummary, DispatchSettings, ScheduleStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dispatch/status", get(status))
        .route("/dispatch/enable", post(enable))
        .route("/dispatch/disable", post(disable))
        .route("/dispatch/run", post(run_now))
        .route("/dispatch/interval", put(set_interval))
        .route("/dispatch/settings", get(get_settings).put(put_settings))
        .route("/dispatch/orphans", get(orphans))
        .route("/dispatch/plan", get(preview_plan))
}

#[derive(Deserialize)]
pub struct IntervalRequest {
    pub seconds: u64,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<ScheduleStatus> {
    Json(state.scheduler.status(Utc::now()))
}

async fn enable(State(state): State<Arc<AppState>>) -> Json<ScheduleStatus> {
    state.scheduler.enable(state.coordinator.cycle_fn());
    Json(state.scheduler.status(Utc::now()))
}

async fn disable(State(state): State<Arc<AppState>>) -> Json<ScheduleStatus> {
    state.scheduler.disable();
    Json(state.scheduler.status(Utc::now()))
}

async fn run_now(State(state): State<Arc<AppState>>) -> Result<Json<CycleSummary>, AppError> {
    let summary = state
        .scheduler
        .trigger_manual(state.coordinator.cycle_fn())
        .await?;
    Ok(Json(summary))
}

async fn preview_plan(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PlanEntry>>, AppError> {
    Ok(Json(state.coordinator.preview().await?))
}

async fn set_interval(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IntervalRequest>,
) -> Result<Json<ScheduleStatus>, AppError> {
    state.scheduler.set_interval(payload.seconds)?;
    Ok(Json(state.scheduler.status(Utc::now())))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<DispatchSettings> {
    Json(state.settings.read().clone())
}

async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DispatchSettings>,
) -> Result<Json<DispatchSettings>, AppError> {
    if !payload.max_distance_km.is_finite() || payload.max_distance_km <= 0.0 {
        return Err(AppError::BadRequest("max_distance_km must be > 0".to_string()));
    }

    *state.settings.write() = payload.clone();
    Ok(Json(payload))
}

/// Deliveries stuck in progress without a driver; repair with `/deliveries/:id/reset`.
async fn orphans(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryRequest>> {
    Json(state.store.find_orphaned_deliveries())
}
