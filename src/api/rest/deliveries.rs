use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::assignment::assign_delivery;
use crate::engine::transitions::{advance_status, cancel_delivery};
use crate::error::AppError;
use crate::models::delivery::{CustomerInfo, Delivery, DeliveryStatus};
use crate::models::location::GeoPoint;
use crate::projection::{status_counts, StatusCounts};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery).get(list_deliveries))
        .route("/deliveries/summary", get(delivery_summary))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/assign", post(assign))
        .route("/deliveries/:id/advance", post(advance))
        .route("/deliveries/:id/cancel", post(cancel))
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub company_id: Uuid,
    pub customer: CustomerInfo,
    pub customer_location: GeoPoint,
    pub fee: f64,
    #[serde(default)]
    pub notes: String,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    /// The acting driver, as supplied by the session provider.
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
pub struct CompanyFilter {
    pub company_id: Option<Uuid>,
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<Json<Delivery>, AppError> {
    if payload.customer.name.trim().is_empty() {
        return Err(AppError::Validation(
            "customer name cannot be empty".to_string(),
        ));
    }
    if payload.customer.address.trim().is_empty() {
        return Err(AppError::Validation(
            "customer address cannot be empty".to_string(),
        ));
    }
    if payload.fee < 0.0 {
        return Err(AppError::Validation("fee cannot be negative".to_string()));
    }

    let now = Utc::now();
    let delivery = Delivery {
        id: Uuid::new_v4(),
        company_id: payload.company_id,
        customer: payload.customer,
        customer_location: payload.customer_location,
        driver_id: None,
        driver_name: None,
        fee: payload.fee,
        notes: payload.notes,
        status: DeliveryStatus::Pending,
        driver_location: None,
        last_location_update: None,
        created_at: now,
        updated_at: now,
    };

    state.deliveries.insert(delivery.id, delivery.clone());
    state.publish_delivery(&delivery);

    Ok(Json(delivery))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = state
        .deliveries
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

    Ok(Json(delivery.value().clone()))
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CompanyFilter>,
) -> Json<Vec<Delivery>> {
    let mut deliveries: Vec<Delivery> = state
        .deliveries
        .iter()
        .filter(|entry| {
            filter
                .company_id
                .is_none_or(|company_id| entry.company_id == company_id)
        })
        .map(|entry| entry.value().clone())
        .collect();
    deliveries.sort_by_key(|delivery| delivery.created_at);

    Json(deliveries)
}

async fn delivery_summary(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CompanyFilter>,
) -> Json<StatusCounts> {
    let deliveries: Vec<Delivery> = state
        .deliveries
        .iter()
        .filter(|entry| {
            filter
                .company_id
                .is_none_or(|company_id| entry.company_id == company_id)
        })
        .map(|entry| entry.value().clone())
        .collect();

    Json(status_counts(&deliveries))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = assign_delivery(&state, id, payload.driver_id)?;
    Ok(Json(delivery))
}

async fn advance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = advance_status(&state, id, payload.driver_id)?;
    Ok(Json(delivery))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = cancel_delivery(&state, id)?;
    Ok(Json(delivery))
}
