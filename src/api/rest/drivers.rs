use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/status", patch(update_driver_status))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub vehicle_type: String,
    pub rating: f64,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if payload.vehicle_type.trim().is_empty() {
        return Err(AppError::BadRequest("vehicle_type cannot be empty".to_string()));
    }

    let driver = state.store.insert_driver(Driver::new(
        payload.name.trim(),
        payload.vehicle_type.trim(),
        payload.rating,
    ));
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    Json(state.store.drivers())
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = state.store.set_driver_status(id, payload.status)?;
    Ok(Json(driver))
}
