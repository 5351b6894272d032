use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::batches::{auto_assign_volunteers, generate_batches};
use crate::error::AppError;
use crate::models::assignment::{BatchGeneration, VolunteerAssignment};
use crate::models::batch::Batch;
use crate::models::campaign::Campaign;
use crate::models::capacity::Capacity;
use crate::models::courier::CourierRole;
use crate::models::item::{Item, ItemStatus, Site};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/campaigns", post(create_campaign))
        .route("/campaigns/:id/items", post(add_item))
        .route("/campaigns/:id/batches/generate", post(generate))
        .route("/campaigns/:id/batches", get(list_batches))
        .route("/campaigns/:id/auto-assign", post(auto_assign))
}

#[derive(Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub organizer: Site,
    #[serde(default)]
    pub volunteers: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub name: String,
    pub business: Site,
    #[serde(default)]
    pub size: Capacity,
}

async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCampaignRequest>,
) -> Result<Json<Campaign>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    for volunteer in &payload.volunteers {
        let courier = state.store.courier(*volunteer)?;
        if courier.role != CourierRole::Volunteer {
            return Err(AppError::Validation(format!(
                "courier {volunteer} is not a volunteer"
            )));
        }
    }

    let campaign = Campaign {
        id: Uuid::new_v4(),
        name: payload.name,
        organizer: payload.organizer,
        volunteers: payload.volunteers,
        created_at: state.clock.now(),
    };

    state.store.save_campaign(campaign.clone());
    Ok(Json(campaign))
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    Json(payload): Json<AddItemRequest>,
) -> Result<Json<Item>, AppError> {
    state.store.campaign(campaign_id)?;

    let item = Item {
        id: Uuid::new_v4(),
        campaign_id,
        name: payload.name,
        business: payload.business,
        size: payload.size,
        status: ItemStatus::Pending,
        assignment_status: None,
        assigned_courier: None,
        picked_up_at: None,
        delivered_at: None,
        created_at: state.clock.now(),
    };

    state.store.save_item(item.clone());
    Ok(Json(item))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<BatchGeneration>, AppError> {
    Ok(Json(generate_batches(&state, campaign_id).await?))
}

async fn list_batches(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Vec<Batch>>, AppError> {
    state.store.campaign(campaign_id)?;
    Ok(Json(
        state
            .store
            .find_batches(|batch| batch.campaign_id == campaign_id),
    ))
}

async fn auto_assign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Vec<VolunteerAssignment>>, AppError> {
    Ok(Json(auto_assign_volunteers(&state, campaign_id).await?))
}
