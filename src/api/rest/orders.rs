use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::orders::{self, DeliveryStatusView, NewOrder};
use crate::error::AppError;
use crate::models::assignment::DriverAssignment;
use crate::models::capacity::Capacity;
use crate::models::order::{DeliveryAddress, Order};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", get(status))
        .route("/orders/:id/assign-driver", post(assign_driver))
        .route("/orders/:id/accept", post(accept))
        .route("/orders/:id/reject", post(reject))
        .route("/orders/:id/start-delivery", post(start_delivery))
        .route("/orders/:id/confirm-pickup", post(confirm_pickup))
        .route("/orders/:id/start-completion", post(start_completion))
        .route("/orders/:id/confirm-delivery", post(confirm_delivery))
}

#[derive(Deserialize, Default)]
pub struct AssignDriverRequest {
    pub delivery_address: Option<DeliveryAddress>,
    pub required_capacity: Option<Capacity>,
}

#[derive(Deserialize)]
pub struct DriverRequest {
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
pub struct DriverCodeRequest {
    pub driver_id: Uuid,
    pub code: String,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewOrder>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(orders::create_order(&state, payload)?))
}

async fn get_order(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<Order>, AppError> {
    Ok(Json(state.store.order(id)?))
}

async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryStatusView>, AppError> {
    Ok(Json(orders::delivery_status(&state, id)?))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<AssignDriverRequest>>,
) -> Result<Json<DriverAssignment>, AppError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    Ok(Json(
        orders::assign_driver_to_order(&state, id, payload.delivery_address, payload.required_capacity).await?,
    ))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(orders::accept_delivery(&state, id, payload.driver_id).await?))
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverRequest>,
) -> Result<Json<DriverAssignment>, AppError> {
    Ok(Json(orders::reject_delivery(&state, id, payload.driver_id).await?))
}

async fn start_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(orders::start_delivery(&state, id, payload.driver_id).await?))
}

async fn confirm_pickup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverCodeRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(
        orders::confirm_pickup(&state, id, payload.driver_id, &payload.code).await?,
    ))
}

async fn start_completion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(
        orders::start_delivery_completion(&state, id, payload.driver_id).await?,
    ))
}

async fn confirm_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverCodeRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(
        orders::confirm_delivery(&state, id, payload.driver_id, &payload.code).await?,
    ))
}
