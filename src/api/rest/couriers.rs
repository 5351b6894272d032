use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{patch, post, put};
use chrono::Weekday;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::capacity::Capacity;
use crate::models::courier::{
    Courier, CourierRole, CourierStatus, GeoPoint, TimeWindow, WeeklyAvailability,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route("/couriers/:id/location", patch(update_courier_location))
        .route("/couriers/:id/availability", put(replace_availability))
}

#[derive(Deserialize)]
pub struct AvailabilitySlot {
    pub day: Weekday,
    pub start: String,
    pub end: String,
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub role: CourierRole,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub capacity: Capacity,
    #[serde(default)]
    pub availability: Vec<AvailabilitySlot>,
}

#[derive(Deserialize)]
pub struct ListCouriersQuery {
    pub role: Option<CourierRole>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct ReplaceAvailabilityRequest {
    pub availability: Vec<AvailabilitySlot>,
}

fn weekly_availability(slots: Vec<AvailabilitySlot>) -> Result<WeeklyAvailability, AppError> {
    let mut weekly = WeeklyAvailability::new();
    for slot in slots {
        let window = TimeWindow::parse(&slot.start, &slot.end)?;
        weekly.entry(slot.day).or_default().push(window);
    }
    Ok(weekly)
}

fn checked_location(location: GeoPoint) -> Result<GeoPoint, AppError> {
    if location.is_valid() {
        Ok(location)
    } else {
        Err(AppError::Validation("location must have numeric lat and lng".to_string()))
    }
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    let courier = Courier {
        id: Uuid::new_v4(),
        name: payload.name,
        role: payload.role,
        location: payload.location.map(checked_location).transpose()?,
        capacity: payload.capacity,
        availability: weekly_availability(payload.availability)?,
        status: CourierStatus::Available,
        active_assignments: 0,
        completed_deliveries: 0,
        updated_at: state.clock.now(),
    };

    state.store.save_courier(courier.clone());
    Ok(Json(courier))
}

async fn list_couriers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCouriersQuery>,
) -> Json<Vec<Courier>> {
    let couriers = state
        .store
        .find_couriers(|courier| query.role.is_none_or(|role| courier.role == role));
    Json(couriers)
}

async fn update_courier_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Courier>, AppError> {
    let location = checked_location(payload.location)?;
    let now = state.clock.now();
    let courier = state.store.update_courier(id, |courier| {
        courier.location = Some(location);
        courier.updated_at = now;
    })?;

    Ok(Json(courier))
}

async fn replace_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplaceAvailabilityRequest>,
) -> Result<Json<Courier>, AppError> {
    let availability = weekly_availability(payload.availability)?;
    let now = state.clock.now();
    let courier = state.store.update_courier(id, |courier| {
        courier.availability = availability;
        courier.updated_at = now;
    })?;

    Ok(Json(courier))
}
