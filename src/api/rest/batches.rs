use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::batches;
use crate::error::AppError;
use crate::models::assignment::RankedVolunteer;
use crate::models::batch::Batch;
use crate::routing::planner::PlannedRoute;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/batches/:id", get(get_batch))
        .route("/batches/:id/candidates", get(candidates))
        .route("/batches/:id/assign", post(assign))
        .route("/batches/:id/accept", post(accept))
        .route("/batches/:id/decline", post(decline))
        .route("/batches/:id/start-pickup", post(start_pickup))
        .route("/batches/:id/verify-pickup", post(verify_pickup))
        .route("/batches/:id/start-delivery", post(start_delivery))
        .route("/batches/:id/verify-delivery", post(verify_delivery))
        .route("/batches/:id/check-status", post(check_status))
        .route("/batches/:id/route", get(route))
}

#[derive(Deserialize)]
pub struct CourierRequest {
    pub courier_id: Uuid,
}

#[derive(Deserialize)]
pub struct StartPickupRequest {
    pub business_id: Uuid,
}

#[derive(Deserialize)]
pub struct VerifyPickupRequest {
    pub business_id: Uuid,
    pub code: String,
}

#[derive(Deserialize)]
pub struct VerifyDeliveryRequest {
    pub code: String,
}

async fn get_batch(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<Batch>, AppError> {
    Ok(Json(state.store.batch(id)?))
}

async fn candidates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RankedVolunteer>>, AppError> {
    Ok(Json(batches::candidates_for_batch(&state, id)?))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourierRequest>,
) -> Result<Json<Batch>, AppError> {
    Ok(Json(
        batches::assign_volunteer_to_batch(&state, id, payload.courier_id).await?,
    ))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourierRequest>,
) -> Result<Json<Batch>, AppError> {
    Ok(Json(
        batches::accept_batch_assignment(&state, id, payload.courier_id).await?,
    ))
}

async fn decline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourierRequest>,
) -> Result<Json<Batch>, AppError> {
    Ok(Json(
        batches::decline_batch_assignment(&state, id, payload.courier_id).await?,
    ))
}

async fn start_pickup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StartPickupRequest>,
) -> Result<Json<Batch>, AppError> {
    Ok(Json(
        batches::start_batch_pickup(&state, id, payload.business_id).await?,
    ))
}

async fn verify_pickup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyPickupRequest>,
) -> Result<Json<Batch>, AppError> {
    Ok(Json(
        batches::verify_batch_pickup(&state, id, payload.business_id, &payload.code).await?,
    ))
}

async fn start_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Batch>, AppError> {
    Ok(Json(batches::start_batch_delivery(&state, id).await?))
}

async fn verify_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyDeliveryRequest>,
) -> Result<Json<Batch>, AppError> {
    Ok(Json(
        batches::verify_batch_delivery(&state, id, &payload.code).await?,
    ))
}

async fn check_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Batch>, AppError> {
    Ok(Json(batches::check_batch_completion(&state, id).await?))
}

async fn route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlannedRoute>, AppError> {
    Ok(Json(batches::plan_batch_route(&state, id).await?))
}
