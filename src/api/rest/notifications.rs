use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::notification::Notification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications/:id", get(inbox))
        .route("/notifications/:id/read", post(mark_read))
}

async fn inbox(State(state): State<Arc<AppState>>, Path(recipient): Path<Uuid>) -> Json<Vec<Notification>> {
    Json(state.store.notifications_for(recipient))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let mut notification = state
        .store
        .notifications
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

    notification.read = true;
    Ok(Json(notification.clone()))
}
