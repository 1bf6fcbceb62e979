use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::reroute::MANUAL_REROUTE_REASON;
use crate::error::AppError;
use crate::models::delivery::{DeliveryRequest, Priority, TrackingUpdate};
use crate::models::reroute::RerouteRecord;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery).get(list_deliveries))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/approve", post(approve_delivery))
        .route("/deliveries/:id/complete", post(complete_delivery))
        .route("/deliveries/:id/decline", post(decline_delivery))
        .route("/deliveries/:id/reset", post(reset_delivery))
        .route("/deliveries/:id/reroute", post(reroute_delivery))
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub priority: Priority,
    pub package_type: String,
    pub pickup_location: String,
    pub delivery_location: String,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<Json<DeliveryRequest>, AppError> {
    if payload.pickup_location.trim().is_empty() || payload.delivery_location.trim().is_empty() {
        return Err(AppError::BadRequest(
            "pickup_location and delivery_location are required".to_string(),
        ));
    }

    let mut delivery = DeliveryRequest::new(
        payload.priority,
        payload.package_type,
        payload.pickup_location,
        payload.delivery_location,
    );
    delivery.estimated_delivery = payload.estimated_delivery;
    delivery.tracking_updates.push(TrackingUpdate::new(
        "Request Received",
        Some(delivery.pickup_location.clone()),
        None,
    ));

    Ok(Json(state.store.insert_delivery(delivery)))
}

async fn list_deliveries(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryRequest>> {
    Json(state.store.deliveries())
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let delivery = state
        .store
        .delivery(id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {} not found", id)))?;

    Ok(Json(delivery))
}

async fn approve_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, AppError> {
    Ok(Json(state.store.approve_delivery(id, None)?))
}

async fn complete_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, AppError> {
    Ok(Json(state.store.complete_delivery(id)?))
}

async fn decline_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, AppError> {
    Ok(Json(state.store.decline_delivery(id)?))
}

async fn reset_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, AppError> {
    Ok(Json(state.store.reset_to_pending(id)?))
}

async fn reroute_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RerouteRecord>, AppError> {
    let record = state
        .advisor
        .reroute_by_id(id, MANUAL_REROUTE_REASON)
        .await?;
    Ok(Json(record))
}
