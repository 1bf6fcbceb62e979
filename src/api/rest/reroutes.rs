use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::reroute::MANUAL_REROUTE_REASON;
use crate::error::AppError;
use crate::models::reroute::{
    IncidentKind, RerouteAdvice, RerouteRecord, Severity, TrafficIncident,
};
use crate::state::AppState;
use crate::store::IncidentFeed;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/incidents", post(report_incident).get(list_incidents))
        .route("/reroutes", post(reroute_batch).get(list_reroutes))
        .route("/reroutes/advise", post(advise))
}

#[derive(Deserialize)]
pub struct ReportIncidentRequest {
    pub location: String,
    pub kind: IncidentKind,
    pub severity: Severity,
}

#[derive(Deserialize)]
pub struct BatchRerouteRequest {
    pub delivery_ids: Vec<Uuid>,
    pub reason: Option<String>,
}

async fn report_incident(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReportIncidentRequest>,
) -> Result<Json<TrafficIncident>, AppError> {
    if payload.location.trim().is_empty() {
        return Err(AppError::BadRequest("location cannot be empty".to_string()));
    }

    let incident = state
        .incidents
        .report(payload.location.trim(), payload.kind, payload.severity);
    Ok(Json(incident))
}

async fn list_incidents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TrafficIncident>>, AppError> {
    Ok(Json(state.incidents.list_traffic_incidents().await?))
}

async fn advise(State(state): State<Arc<AppState>>) -> Result<Json<RerouteAdvice>, AppError> {
    Ok(Json(state.advisor.advise().await?))
}

async fn reroute_batch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchRerouteRequest>,
) -> Json<Vec<RerouteRecord>> {
    let reason = payload
        .reason
        .unwrap_or_else(|| MANUAL_REROUTE_REASON.to_string());
    Json(
        state
            .advisor
            .reroute_batch(&payload.delivery_ids, &reason)
            .await,
    )
}

async fn list_reroutes(State(state): State<Arc<AppState>>) -> Json<Vec<RerouteRecord>> {
    Json(state.advisor.history())
}
