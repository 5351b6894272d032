use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::get;
use uuid::Uuid;

use crate::engine::orders;
use crate::error::AppError;
use crate::models::order::Order;
use crate::routing::planner::PlannedRoute;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/:id/assignments", get(assignments))
        .route("/drivers/:id/requests", get(requests))
        .route("/drivers/:id/route", get(route))
}

async fn assignments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(orders::driver_assignments(&state, id)?))
}

async fn requests(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(orders::driver_requests(&state, id)?))
}

async fn route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlannedRoute>, AppError> {
    Ok(Json(orders::plan_driver_route(&state, id).await?))
}
