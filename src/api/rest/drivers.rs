use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::location::LocationSample;
use crate::state::AppState;
use crate::tracker;
use crate::tracker::PositionError;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route("/drivers/:id/online", patch(update_driver_online))
        .route("/drivers/:id/tracking/start", post(start_tracking))
        .route("/drivers/:id/tracking/stop", post(stop_tracking))
        .route("/drivers/:id/fixes", post(push_fix))
        .route("/drivers/:id/position-error", post(push_position_error))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub company_id: Uuid,
    pub name: String,
    pub phone: String,
    pub vehicle: String,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct UpdateOnlineRequest {
    pub is_online: bool,
}

#[derive(Deserialize)]
pub struct FixRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionErrorKind {
    PermissionDenied,
    Unavailable,
}

#[derive(Deserialize)]
pub struct PositionErrorRequest {
    pub kind: PositionErrorKind,
    pub detail: Option<String>,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    let driver = Driver {
        id: Uuid::new_v4(),
        company_id: payload.company_id,
        name: payload.name,
        phone: payload.phone,
        vehicle: payload.vehicle,
        status: DriverStatus::Active,
        is_online: false,
        is_tracking: false,
        location: None,
        last_seen: None,
        tracking_error: None,
    };

    state.drivers.insert(driver.id, driver.clone());
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    let drivers = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(drivers)
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    driver.status = payload.status;
    Ok(Json(driver.clone()))
}

async fn update_driver_online(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOnlineRequest>,
) -> Result<Json<Driver>, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    driver.is_online = payload.is_online;
    Ok(Json(driver.clone()))
}

async fn start_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    tracker::start_tracking(&state, id)?;
    let driver = state
        .drivers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
    Ok(Json(driver.value().clone()))
}

async fn stop_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    tracker::stop_tracking(&state, id)?;
    let driver = state
        .drivers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
    Ok(Json(driver.value().clone()))
}

async fn push_fix(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FixRequest>,
) -> Result<StatusCode, AppError> {
    tracker::report_fix(&state, id, LocationSample::now(payload.lat, payload.lng)).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn push_position_error(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PositionErrorRequest>,
) -> Result<StatusCode, AppError> {
    let error = match payload.kind {
        PositionErrorKind::PermissionDenied => PositionError::PermissionDenied,
        PositionErrorKind::Unavailable => {
            PositionError::Unavailable(payload.detail.unwrap_or_else(|| "unknown".to_string()))
        }
    };

    tracker::report_position_error(&state, id, error).await?;
    Ok(StatusCode::ACCEPTED)
}
