use std::collections::HashSet;
use std::time::Instant;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::clustering::{ClusterInput, cluster_items};
use crate::engine::codes::{generate_code, parse_code, verify_code};
use crate::engine::ranking::{LocalMoment, rank_volunteers};
use crate::error::AppError;
use crate::models::assignment::{BatchGeneration, RankedVolunteer, VolunteerAssignment};
use crate::models::batch::{Batch, BatchStatus};
use crate::models::courier::CourierRole;
use crate::models::item::{AssignmentStatus, ItemStatus};
use crate::models::notification::NotificationCategory;
use crate::models::verification::{BusinessPickupCode, VerificationCode};
use crate::routing::planner::{PlannedRoute, RouteStop, StopKind};
use crate::state::AppState;

const NO_SUITABLE_COURIER: &str = "no suitable courier";

/// Replaces a campaign's unclaimed suggested batches with a fresh
/// clustering of its unassigned items.
pub async fn generate_batches(state: &AppState, campaign_id: Uuid) -> Result<BatchGeneration, AppError> {
    let _campaign_guard = state.locks.acquire(campaign_id).await;
    state.store.campaign(campaign_id)?;

    let replaceable = state.store.find_batches(|batch| {
        batch.campaign_id == campaign_id
            && batch.status == BatchStatus::Suggested
            && batch.assigned_courier.is_none()
    });
    let mut batch_guards = Vec::with_capacity(replaceable.len());
    for batch in &replaceable {
        batch_guards.push(state.locks.acquire(batch.id).await);
    }
    let replaceable: HashSet<Uuid> = replaceable.iter().map(|batch| batch.id).collect();

    let held: HashSet<Uuid> = state
        .store
        .find_batches(|batch| batch.campaign_id == campaign_id && !replaceable.contains(&batch.id))
        .into_iter()
        .flat_map(|batch| batch.items)
        .collect();

    let unassigned = state.store.find_items(|item| {
        item.campaign_id == campaign_id && item.is_unassigned() && !held.contains(&item.id)
    });
    if unassigned.is_empty() {
        info!(campaign_id = %campaign_id, "no unassigned items to batch");
        return Ok(BatchGeneration::NothingToBatch);
    }

    let inputs: Vec<ClusterInput> = unassigned
        .iter()
        .filter_map(|item| {
            item.location().map(|location| ClusterInput {
                item_id: item.id,
                location,
                size: item.size,
            })
        })
        .collect();
    if inputs.is_empty() {
        warn!(campaign_id = %campaign_id, items = unassigned.len(), "no unassigned item has coordinates");
        return Ok(BatchGeneration::NoGeotaggedItems);
    }

    let clusters = cluster_items(&inputs)?;

    let replaced = state.store.delete_batches(|batch| {
        replaceable.contains(&batch.id)
            && batch.status == BatchStatus::Suggested
            && batch.assigned_courier.is_none()
    });

    let now = state.clock.now();
    let batches: Vec<Batch> = clusters
        .into_iter()
        .map(|cluster| {
            Batch::new(
                campaign_id,
                cluster.items,
                cluster.required_capacity,
                cluster.center_point,
                now,
            )
        })
        .collect();

    for batch in &batches {
        state.store.save_batch(batch.clone());
        state.metrics.transition("batch", "suggested");
    }

    info!(
        campaign_id = %campaign_id,
        created = batches.len(),
        replaced,
        skipped = unassigned.len() - inputs.len(),
        "batches generated"
    );

    Ok(BatchGeneration::Created { batches })
}

/// Proposes the best available volunteer for every suggested batch of the
/// campaign. A volunteer is proposed at most once per run.
pub async fn auto_assign_volunteers(
    state: &AppState,
    campaign_id: Uuid,
) -> Result<Vec<VolunteerAssignment>, AppError> {
    let _campaign_guard = state.locks.acquire(campaign_id).await;
    let campaign = state.store.campaign(campaign_id)?;
    let roster = state.store.couriers_by_ids(&campaign.volunteers);
    let moment = LocalMoment::at(state.clock.now(), state.settings.availability_offset);

    let suggested = state
        .store
        .find_batches(|batch| batch.campaign_id == campaign_id && batch.status == BatchStatus::Suggested);

    let mut proposed: HashSet<Uuid> = HashSet::new();
    let mut outcomes = Vec::with_capacity(suggested.len());

    for candidate in suggested {
        let _guard = state.locks.acquire(candidate.id).await;
        let Ok(mut batch) = state.store.batch(candidate.id) else {
            continue;
        };
        if batch.status != BatchStatus::Suggested {
            continue;
        }

        let started = Instant::now();
        let ranked = rank_volunteers(
            &batch.center_point,
            batch.required_capacity,
            &roster,
            &proposed,
            &moment,
        );
        state
            .metrics
            .ranking_latency_seconds
            .with_label_values(&["batch"])
            .observe(started.elapsed().as_secs_f64());

        let Some(best) = ranked.into_iter().next() else {
            state
                .metrics
                .assignment_outcomes_total
                .with_label_values(&["batch", "no_candidate"])
                .inc();
            warn!(batch_id = %batch.id, "no suitable courier for batch");
            outcomes.push(VolunteerAssignment::NoCandidate {
                batch_id: batch.id,
                reason: NO_SUITABLE_COURIER.to_string(),
            });
            continue;
        };

        request_assignment(state, &mut batch, best.courier_id);
        proposed.insert(best.courier_id);
        state
            .metrics
            .assignment_outcomes_total
            .with_label_values(&["batch", "assigned"])
            .inc();

        outcomes.push(VolunteerAssignment::Assigned {
            batch_id: batch.id,
            courier_id: best.courier_id,
            score: best.score,
        });
    }

    Ok(outcomes)
}

/// Eligible volunteers for a batch, best first, without assigning anyone.
pub fn candidates_for_batch(state: &AppState, batch_id: Uuid) -> Result<Vec<RankedVolunteer>, AppError> {
    let batch = state.store.batch(batch_id)?;
    let campaign = state.store.campaign(batch.campaign_id)?;
    let roster = state.store.couriers_by_ids(&campaign.volunteers);
    let moment = LocalMoment::at(state.clock.now(), state.settings.availability_offset);

    Ok(rank_volunteers(
        &batch.center_point,
        batch.required_capacity,
        &roster,
        &HashSet::new(),
        &moment,
    ))
}

pub async fn assign_volunteer_to_batch(
    state: &AppState,
    batch_id: Uuid,
    courier_id: Uuid,
) -> Result<Batch, AppError> {
    let _guard = state.locks.acquire(batch_id).await;
    let mut batch = state.store.batch(batch_id)?;

    if batch.status != BatchStatus::Suggested {
        return Err(AppError::InvalidState(format!(
            "batch {batch_id} cannot be assigned while {:?}",
            batch.status
        )));
    }

    let courier = state.store.courier(courier_id)?;
    if courier.role != CourierRole::Volunteer {
        return Err(AppError::Validation(format!(
            "courier {courier_id} is not a volunteer"
        )));
    }
    if !courier.capacity.satisfies(batch.required_capacity) {
        return Err(AppError::Validation(format!(
            "courier capacity {:?} cannot carry a {:?} batch",
            courier.capacity, batch.required_capacity
        )));
    }

    request_assignment(state, &mut batch, courier_id);
    state
        .metrics
        .assignment_outcomes_total
        .with_label_values(&["batch", "manual"])
        .inc();

    Ok(batch)
}

pub async fn accept_batch_assignment(
    state: &AppState,
    batch_id: Uuid,
    courier_id: Uuid,
) -> Result<Batch, AppError> {
    let _guard = state.locks.acquire(batch_id).await;
    let mut batch = state.store.batch(batch_id)?;
    ensure_pending_for(&batch, courier_id)?;

    batch.status = BatchStatus::Assigned;
    batch.assignment_status = Some(AssignmentStatus::Accepted);
    cascade_items(state, &batch, ItemStatus::Assigned, Some(AssignmentStatus::Accepted));
    state.store.save_batch(batch.clone());
    state.store.update_courier(courier_id, |courier| {
        courier.active_assignments += 1;
        courier.updated_at = state.clock.now();
    })?;

    state.metrics.transition("batch", "accepted");
    state.metrics.pending_requests.dec();
    notify_organizer(state, &batch, format!("A volunteer accepted batch {}", batch.id));
    info!(batch_id = %batch.id, courier_id = %courier_id, "batch assignment accepted");

    Ok(batch)
}

pub async fn decline_batch_assignment(
    state: &AppState,
    batch_id: Uuid,
    courier_id: Uuid,
) -> Result<Batch, AppError> {
    let _guard = state.locks.acquire(batch_id).await;
    let mut batch = state.store.batch(batch_id)?;
    ensure_pending_for(&batch, courier_id)?;

    batch.status = BatchStatus::Suggested;
    batch.assignment_status = Some(AssignmentStatus::Declined);
    batch.assigned_courier = None;
    batch.assignment_requested_at = None;
    cascade_items(state, &batch, ItemStatus::Pending, None);
    state.store.save_batch(batch.clone());

    state.metrics.transition("batch", "declined");
    state.metrics.pending_requests.dec();
    notify_organizer(state, &batch, format!("A volunteer declined batch {}", batch.id));
    info!(batch_id = %batch.id, courier_id = %courier_id, "batch assignment declined");

    Ok(batch)
}

/// Issues the pickup code shared by every item `business_id` contributes
/// to the batch and sends it to that business.
pub async fn start_batch_pickup(
    state: &AppState,
    batch_id: Uuid,
    business_id: Uuid,
) -> Result<Batch, AppError> {
    let _guard = state.locks.acquire(batch_id).await;
    let mut batch = state.store.batch(batch_id)?;

    if !matches!(batch.status, BatchStatus::Assigned | BatchStatus::InProgress) {
        return Err(AppError::InvalidState(format!(
            "pickup cannot start while batch is {:?}",
            batch.status
        )));
    }

    let owned: Vec<_> = state
        .store
        .items_by_ids(&batch.items)
        .into_iter()
        .filter(|item| item.business.id == business_id)
        .collect();
    if owned.is_empty() {
        return Err(AppError::NotFound(format!(
            "business {business_id} has no items in batch {batch_id}"
        )));
    }
    if owned.iter().all(|item| item.status != ItemStatus::Assigned) {
        return Err(AppError::InvalidState(format!(
            "items from business {business_id} are already picked up"
        )));
    }

    let code = generate_code();
    let issued = VerificationCode::issue(code.clone(), state.clock.now());
    match batch.pickup_code_for_mut(business_id) {
        Some(entry) => entry.code = issued,
        None => batch.pickup_codes.push(BusinessPickupCode {
            business_id,
            code: issued,
        }),
    }

    if batch.status != BatchStatus::InProgress {
        batch.status = BatchStatus::InProgress;
        state.metrics.transition("batch", "in_progress");
    }
    state.store.save_batch(batch.clone());

    state.notify(
        business_id,
        NotificationCategory::PickupCode,
        format!("Pickup code for batch {batch_id}: {code}"),
        Some(json!({ "batch_id": batch_id, "code": code })),
    );
    info!(batch_id = %batch_id, business_id = %business_id, "batch pickup started");

    Ok(batch)
}

pub async fn verify_batch_pickup(
    state: &AppState,
    batch_id: Uuid,
    business_id: Uuid,
    code: &str,
) -> Result<Batch, AppError> {
    let code = parse_code(code)?;
    let _guard = state.locks.acquire(batch_id).await;
    let mut batch = state.store.batch(batch_id)?;

    if batch.status != BatchStatus::InProgress {
        return Err(AppError::InvalidState(format!(
            "pickup cannot be verified while batch is {:?}",
            batch.status
        )));
    }

    let courier_id = batch
        .assigned_courier
        .ok_or_else(|| AppError::Internal(format!("in-progress batch {batch_id} has no courier")))?;
    let now = state.clock.now();
    let entry = batch.pickup_code_for_mut(business_id).ok_or_else(|| {
        AppError::InvalidState(format!("pickup from business {business_id} was not started"))
    })?;
    verify_code(&mut entry.code, code, courier_id, now)?;

    let picked: Vec<Uuid> = state
        .store
        .items_by_ids(&batch.items)
        .into_iter()
        .filter(|item| item.business.id == business_id && item.status == ItemStatus::Assigned)
        .map(|item| item.id)
        .collect();
    state.store.update_items(&picked, |item| {
        item.status = ItemStatus::PickedUp;
        item.picked_up_at = Some(now);
    });
    state.store.save_batch(batch.clone());

    state.metrics.transition("batch", "pickup_verified");
    notify_organizer(
        state,
        &batch,
        format!("{} items of batch {batch_id} were picked up", picked.len()),
    );
    info!(batch_id = %batch_id, business_id = %business_id, items = picked.len(), "batch pickup verified");

    Ok(batch)
}

/// Issues the batch delivery code to the campaign organizer once every
/// item has been picked up.
pub async fn start_batch_delivery(state: &AppState, batch_id: Uuid) -> Result<Batch, AppError> {
    let _guard = state.locks.acquire(batch_id).await;
    let mut batch = state.store.batch(batch_id)?;

    if batch.status != BatchStatus::InProgress {
        return Err(AppError::InvalidState(format!(
            "delivery cannot start while batch is {:?}",
            batch.status
        )));
    }

    let waiting = state
        .store
        .items_by_ids(&batch.items)
        .iter()
        .filter(|item| item.status != ItemStatus::PickedUp)
        .count();
    if waiting > 0 {
        return Err(AppError::InvalidState(format!(
            "{waiting} items of batch {batch_id} are not picked up"
        )));
    }

    let campaign = state.store.campaign(batch.campaign_id)?;
    let code = generate_code();
    batch.delivery_code = Some(VerificationCode::issue(code.clone(), state.clock.now()));
    state.store.save_batch(batch.clone());

    state.notify(
        campaign.organizer.id,
        NotificationCategory::DeliveryCode,
        format!("Delivery code for batch {batch_id}: {code}"),
        Some(json!({ "batch_id": batch_id, "code": code })),
    );
    info!(batch_id = %batch_id, "batch delivery started");

    Ok(batch)
}

pub async fn verify_batch_delivery(state: &AppState, batch_id: Uuid, code: &str) -> Result<Batch, AppError> {
    let code = parse_code(code)?;
    let _guard = state.locks.acquire(batch_id).await;
    let mut batch = state.store.batch(batch_id)?;

    if batch.status != BatchStatus::InProgress {
        return Err(AppError::InvalidState(format!(
            "delivery cannot be verified while batch is {:?}",
            batch.status
        )));
    }

    let courier_id = batch
        .assigned_courier
        .ok_or_else(|| AppError::Internal(format!("in-progress batch {batch_id} has no courier")))?;
    let now = state.clock.now();
    let stored = batch
        .delivery_code
        .as_mut()
        .ok_or_else(|| AppError::InvalidState(format!("delivery of batch {batch_id} was not started")))?;
    verify_code(stored, code, courier_id, now)?;

    let delivered = state.store.update_items(&batch.items, |item| {
        item.status = ItemStatus::Delivered;
        item.delivered_at = Some(now);
    });
    state.store.save_batch(batch.clone());
    state.metrics.transition("batch", "delivery_verified");
    info!(batch_id = %batch_id, items = delivered, "batch delivery verified");

    complete_if_delivered(state, &mut batch)?;
    Ok(batch)
}

/// Marks the batch completed when every member item has been delivered.
pub async fn check_batch_completion(state: &AppState, batch_id: Uuid) -> Result<Batch, AppError> {
    let _guard = state.locks.acquire(batch_id).await;
    let mut batch = state.store.batch(batch_id)?;
    complete_if_delivered(state, &mut batch)?;
    Ok(batch)
}

/// Returns a batch whose request went unanswered past the timeout to the
/// suggested pool. Does nothing if the batch is no longer awaiting an
/// answer or the deadline has not passed.
pub async fn reclaim_batch(state: &AppState, batch_id: Uuid) -> Result<bool, AppError> {
    let _guard = state.locks.acquire(batch_id).await;
    let mut batch = state.store.batch(batch_id)?;

    let now = state.clock.now();
    let expired = batch
        .assignment_requested_at
        .is_some_and(|requested_at| requested_at + state.settings.batch_timeout <= now);
    if !batch.awaiting_response() || !expired {
        return Ok(false);
    }

    let courier_id = batch.assigned_courier;
    batch.status = BatchStatus::Suggested;
    batch.assignment_status = None;
    batch.assigned_courier = None;
    batch.assignment_requested_at = None;
    cascade_items(state, &batch, ItemStatus::Pending, None);
    state.store.save_batch(batch.clone());

    state.metrics.transition("batch", "timed_out");
    state.metrics.reclaimed_total.with_label_values(&["batch"]).inc();
    state.metrics.pending_requests.dec();

    if let Some(courier_id) = courier_id {
        state.notify(
            courier_id,
            NotificationCategory::AssignmentTimeout,
            format!("Your request for batch {batch_id} expired"),
            Some(json!({ "batch_id": batch_id })),
        );
    }
    warn!(batch_id = %batch_id, courier_id = ?courier_id, "unanswered batch request reclaimed");

    Ok(true)
}

/// Route for the assigned courier: current position, every business with
/// items still to collect, then the campaign organizer.
pub async fn plan_batch_route(state: &AppState, batch_id: Uuid) -> Result<PlannedRoute, AppError> {
    let batch = state.store.batch(batch_id)?;
    let courier_id = batch
        .assigned_courier
        .ok_or_else(|| AppError::InvalidState(format!("batch {batch_id} has no assigned courier")))?;
    let courier = state.store.courier(courier_id)?;
    let origin = courier
        .valid_location()
        .ok_or_else(|| AppError::Validation(format!("courier {courier_id} has no location")))?;
    let campaign = state.store.campaign(batch.campaign_id)?;

    let mut visited = HashSet::new();
    let mut pickups = Vec::new();
    for item in state.store.items_by_ids(&batch.items) {
        if matches!(item.status, ItemStatus::PickedUp | ItemStatus::Delivered) {
            continue;
        }
        let Some(location) = item.location() else {
            continue;
        };
        if visited.insert(item.business.id) {
            pickups.push(RouteStop::new(
                StopKind::Pickup,
                location,
                Some(item.business.id),
                item.business.name.clone(),
            ));
        }
    }

    let drop_off = campaign.organizer.valid_location().map(|location| {
        RouteStop::new(StopKind::End, location, Some(campaign.id), campaign.organizer.name.clone())
    });

    let start = RouteStop::new(StopKind::Start, origin, Some(courier.id), courier.name.clone());
    Ok(state.planner.plan(start, pickups, drop_off).await)
}

fn request_assignment(state: &AppState, batch: &mut Batch, courier_id: Uuid) {
    batch.status = BatchStatus::Requested;
    batch.assignment_status = Some(AssignmentStatus::Pending);
    batch.assigned_courier = Some(courier_id);
    batch.assignment_requested_at = Some(state.clock.now());
    cascade_items(state, batch, ItemStatus::Requested, Some(AssignmentStatus::Pending));
    state.store.save_batch(batch.clone());

    state.metrics.transition("batch", "requested");
    state.metrics.pending_requests.inc();
    state.notify(
        courier_id,
        NotificationCategory::AssignmentRequest,
        format!("You have been asked to collect a batch of {} items", batch.items.len()),
        Some(json!({ "batch_id": batch.id })),
    );
    info!(batch_id = %batch.id, courier_id = %courier_id, "batch assignment requested");
}

fn ensure_pending_for(batch: &Batch, courier_id: Uuid) -> Result<(), AppError> {
    if !batch.is_assigned_to(courier_id) {
        return Err(AppError::Unauthorized(format!(
            "courier {courier_id} is not assigned to batch {}",
            batch.id
        )));
    }
    if !batch.awaiting_response() {
        return Err(AppError::InvalidState(format!(
            "batch {} is not awaiting a response",
            batch.id
        )));
    }
    Ok(())
}

fn cascade_items(state: &AppState, batch: &Batch, status: ItemStatus, assignment_status: Option<AssignmentStatus>) {
    let courier = batch.assigned_courier;
    state.store.update_items(&batch.items, |item| {
        item.status = status;
        item.assignment_status = assignment_status;
        item.assigned_courier = courier;
    });
}

fn complete_if_delivered(state: &AppState, batch: &mut Batch) -> Result<bool, AppError> {
    if batch.status == BatchStatus::Completed {
        return Ok(false);
    }

    let items = state.store.items_by_ids(&batch.items);
    if items.is_empty() || items.iter().any(|item| item.status != ItemStatus::Delivered) {
        return Ok(false);
    }

    batch.status = BatchStatus::Completed;
    state.store.save_batch(batch.clone());

    if let Some(courier_id) = batch.assigned_courier {
        state.store.update_courier(courier_id, |courier| {
            courier.active_assignments = courier.active_assignments.saturating_sub(1);
            courier.completed_deliveries += 1;
            courier.updated_at = state.clock.now();
        })?;
        state.notify(
            courier_id,
            NotificationCategory::StatusUpdate,
            format!("Batch {} is complete. Thank you!", batch.id),
            Some(json!({ "batch_id": batch.id })),
        );
    }

    state.metrics.transition("batch", "completed");
    notify_organizer(state, batch, format!("Batch {} was delivered", batch.id));
    info!(batch_id = %batch.id, "batch completed");

    Ok(true)
}

fn notify_organizer(state: &AppState, batch: &Batch, message: String) {
    match state.store.campaign(batch.campaign_id) {
        Ok(campaign) => {
            state.notify(
                campaign.organizer.id,
                NotificationCategory::StatusUpdate,
                message,
                Some(json!({ "batch_id": batch.id, "status": batch.status })),
            );
        }
        Err(err) => warn!(batch_id = %batch.id, error = %err, "organizer not notified"),
    }
}
