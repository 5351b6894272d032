use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::codes::{generate_code, parse_code, verify_code};
use crate::engine::consolidation::driver_can_take;
use crate::engine::ranking::rank_drivers;
use crate::error::AppError;
use crate::models::assignment::DriverAssignment;
use crate::models::capacity::Capacity;
use crate::models::courier::{CourierRole, CourierStatus};
use crate::models::item::Site;
use crate::models::notification::NotificationCategory;
use crate::models::order::{
    Actor, DeliveryAddress, DeliveryStatus, Order, OrderEvent, PaymentStatus, StatusChange,
};
use crate::models::verification::VerificationCode;
use crate::routing::planner::{PlannedRoute, RouteStop, StopKind};
use crate::state::AppState;

/// A placed, paid order handed over for delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub buyer_id: Uuid,
    pub sale_item_id: Uuid,
    pub business: Site,
    pub quantity: u32,
    #[serde(default)]
    pub required_capacity: Capacity,
    pub delivery_address: DeliveryAddress,
    #[serde(default = "paid")]
    pub payment_status: PaymentStatus,
}

fn paid() -> PaymentStatus {
    PaymentStatus::Paid
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStatusView {
    pub order_id: Uuid,
    pub delivery_status: DeliveryStatus,
    pub payment_status: PaymentStatus,
    pub driver_id: Option<Uuid>,
    pub pickup_code_sent: bool,
    pub picked_up: bool,
    pub delivery_code_sent: bool,
    pub delivered: bool,
    pub status_history: Vec<StatusChange>,
}

pub fn create_order(state: &AppState, new_order: NewOrder) -> Result<Order, AppError> {
    if new_order.quantity == 0 {
        return Err(AppError::Validation("quantity must be > 0".to_string()));
    }

    let now = state.clock.now();
    let mut order = Order {
        id: Uuid::new_v4(),
        buyer_id: new_order.buyer_id,
        sale_item_id: new_order.sale_item_id,
        business: new_order.business,
        quantity: new_order.quantity,
        required_capacity: new_order.required_capacity,
        delivery_address: new_order.delivery_address,
        assigned_courier: None,
        delivery_status: DeliveryStatus::WaitingForDriver,
        payment_status: new_order.payment_status,
        status_history: Vec::new(),
        pickup_code: None,
        delivery_code: None,
        declined_by: Vec::new(),
        assignment_expires_at: None,
        created_at: now,
        delivered_at: None,
    };
    order.record(DeliveryStatus::WaitingForDriver, Actor::System, now);

    state.store.save_order(order.clone());
    state.metrics.transition("order", "created");
    info!(order_id = %order.id, buyer_id = %order.buyer_id, "order accepted for delivery");

    Ok(order)
}

/// Offers the order to the nearest driver who can take it. A new address
/// or capacity requirement, when given, replaces the stored one.
pub async fn assign_driver_to_order(
    state: &AppState,
    order_id: Uuid,
    delivery_address: Option<DeliveryAddress>,
    required_capacity: Option<Capacity>,
) -> Result<DriverAssignment, AppError> {
    let _guard = state.locks.acquire(order_id).await;
    let mut order = state.store.order(order_id)?;

    if order.delivery_status != DeliveryStatus::WaitingForDriver {
        return Err(AppError::InvalidState(format!(
            "order {order_id} is {:?}, not waiting for a driver",
            order.delivery_status
        )));
    }

    if let Some(address) = delivery_address {
        order.delivery_address = address;
    }
    if let Some(capacity) = required_capacity {
        order.required_capacity = capacity;
    }

    if order.delivery_address.valid_location().is_none() {
        return Err(AppError::Validation(
            "delivery address needs numeric coordinates".to_string(),
        ));
    }
    if order.business.valid_location().is_none() {
        return Err(AppError::Validation(format!(
            "business {} has no coordinates",
            order.business.id
        )));
    }

    Ok(dispatch(state, &mut order).await)
}

pub async fn accept_delivery(state: &AppState, order_id: Uuid, driver_id: Uuid) -> Result<Order, AppError> {
    let _guard = state.locks.acquire(order_id).await;
    let mut order = state.store.order(order_id)?;
    ensure_driver(&order, driver_id)?;
    ensure_status(&order, DeliveryStatus::DriverAssigned)?;

    let now = state.clock.now();
    order.assignment_expires_at = None;
    order.advance(DeliveryStatus::PickupReady, Actor::Courier(driver_id), now);
    state.store.save_order(order.clone());
    state.store.update_courier(driver_id, |driver| {
        driver.status = CourierStatus::Busy;
        driver.updated_at = now;
    })?;

    state.metrics.transition("order", "accepted");
    state.metrics.pending_requests.dec();
    state.notify(
        order.buyer_id,
        NotificationCategory::StatusUpdate,
        "A driver accepted your order",
        Some(json!({ "order_id": order.id, "driver_id": driver_id })),
    );
    info!(order_id = %order.id, driver_id = %driver_id, "delivery accepted");

    Ok(order)
}

/// Releases the driver, excludes them from this order for good and looks
/// for a replacement straight away.
pub async fn reject_delivery(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
) -> Result<DriverAssignment, AppError> {
    let _guard = state.locks.acquire(order_id).await;
    let mut order = state.store.order(order_id)?;
    ensure_driver(&order, driver_id)?;
    ensure_status(&order, DeliveryStatus::DriverAssigned)?;

    release_driver(state, &mut order, driver_id, OrderEvent::DriverRejected, Actor::Courier(driver_id));
    state.metrics.transition("order", "rejected");
    info!(order_id = %order.id, driver_id = %driver_id, "delivery rejected");

    Ok(dispatch(state, &mut order).await)
}

/// Takes an unanswered offer back from its driver once the deadline has
/// passed and re-dispatches the order. Returns `None` when the order is not
/// (or no longer) overdue.
pub async fn reclaim_order(state: &AppState, order_id: Uuid) -> Result<Option<DriverAssignment>, AppError> {
    let _guard = state.locks.acquire(order_id).await;
    let mut order = state.store.order(order_id)?;

    let now = state.clock.now();
    let overdue = order.delivery_status == DeliveryStatus::DriverAssigned
        && order.assignment_expires_at.is_some_and(|deadline| deadline <= now);
    if !overdue {
        return Ok(None);
    }

    let driver_id = order
        .assigned_courier
        .ok_or_else(|| AppError::Internal(format!("assigned order {order_id} has no driver")))?;

    release_driver(state, &mut order, driver_id, OrderEvent::DriverTimeout, Actor::System);
    state.metrics.transition("order", "timed_out");
    state.metrics.reclaimed_total.with_label_values(&["order"]).inc();
    state.notify(
        driver_id,
        NotificationCategory::AssignmentTimeout,
        format!("Your delivery request for order {order_id} expired"),
        Some(json!({ "order_id": order_id })),
    );
    warn!(order_id = %order_id, driver_id = %driver_id, "unanswered delivery request reclaimed");

    Ok(Some(dispatch(state, &mut order).await))
}

/// Issues the pickup code and sends it to the business.
pub async fn start_delivery(state: &AppState, order_id: Uuid, driver_id: Uuid) -> Result<Order, AppError> {
    let _guard = state.locks.acquire(order_id).await;
    let mut order = state.store.order(order_id)?;
    ensure_driver(&order, driver_id)?;
    ensure_status(&order, DeliveryStatus::PickupReady)?;

    let code = generate_code();
    order.pickup_code = Some(VerificationCode::issue(code.clone(), state.clock.now()));
    state.store.save_order(order.clone());

    state.notify(
        order.business.id,
        NotificationCategory::PickupCode,
        format!("Pickup code for order {order_id}: {code}"),
        Some(json!({ "order_id": order_id, "code": code })),
    );
    info!(order_id = %order_id, driver_id = %driver_id, "pickup started");

    Ok(order)
}

pub async fn confirm_pickup(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
    code: &str,
) -> Result<Order, AppError> {
    let code = parse_code(code)?;
    let _guard = state.locks.acquire(order_id).await;
    let mut order = state.store.order(order_id)?;
    ensure_driver(&order, driver_id)?;
    ensure_status(&order, DeliveryStatus::PickupReady)?;

    let now = state.clock.now();
    let stored = order
        .pickup_code
        .as_mut()
        .ok_or_else(|| AppError::InvalidState(format!("pickup of order {order_id} was not started")))?;
    verify_code(stored, code, driver_id, now)?;

    order.advance(DeliveryStatus::PickedUp, Actor::Courier(driver_id), now);
    order.advance(DeliveryStatus::Delivering, Actor::Courier(driver_id), now);
    state.store.save_order(order.clone());

    state.metrics.transition("order", "picked_up");
    state.notify(
        order.buyer_id,
        NotificationCategory::StatusUpdate,
        "Your order has been picked up and is on its way",
        Some(json!({ "order_id": order_id })),
    );
    info!(order_id = %order_id, driver_id = %driver_id, "pickup confirmed");

    Ok(order)
}

/// Issues the delivery code and sends it to the buyer.
pub async fn start_delivery_completion(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
) -> Result<Order, AppError> {
    let _guard = state.locks.acquire(order_id).await;
    let mut order = state.store.order(order_id)?;
    ensure_driver(&order, driver_id)?;
    ensure_status(&order, DeliveryStatus::Delivering)?;

    let code = generate_code();
    order.delivery_code = Some(VerificationCode::issue(code.clone(), state.clock.now()));
    state.store.save_order(order.clone());

    state.notify(
        order.buyer_id,
        NotificationCategory::DeliveryCode,
        format!("Your delivery code for order {order_id} is {code}"),
        Some(json!({ "order_id": order_id, "code": code })),
    );
    info!(order_id = %order_id, driver_id = %driver_id, "delivery completion started");

    Ok(order)
}

pub async fn confirm_delivery(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
    code: &str,
) -> Result<Order, AppError> {
    let code = parse_code(code)?;
    let _guard = state.locks.acquire(order_id).await;
    let mut order = state.store.order(order_id)?;
    ensure_driver(&order, driver_id)?;
    ensure_status(&order, DeliveryStatus::Delivering)?;

    let now = state.clock.now();
    let stored = order
        .delivery_code
        .as_mut()
        .ok_or_else(|| AppError::InvalidState(format!("delivery of order {order_id} was not started")))?;
    verify_code(stored, code, driver_id, now)?;

    order.advance(DeliveryStatus::Delivered, Actor::Courier(driver_id), now);
    order.payment_status = PaymentStatus::Fulfilled;
    order.delivered_at = Some(now);
    state.store.save_order(order.clone());

    state.store.update_courier(driver_id, |driver| {
        driver.active_assignments = driver.active_assignments.saturating_sub(1);
        driver.completed_deliveries += 1;
        if driver.active_assignments == 0 {
            driver.status = CourierStatus::Available;
        }
        driver.updated_at = now;
    })?;

    state.metrics.transition("order", "delivered");
    state.notify(
        order.buyer_id,
        NotificationCategory::StatusUpdate,
        "Your order has been delivered",
        Some(json!({ "order_id": order_id })),
    );
    info!(order_id = %order_id, driver_id = %driver_id, "delivery confirmed");

    Ok(order)
}

/// Orders the driver is currently carrying or has been offered.
pub fn driver_assignments(state: &AppState, driver_id: Uuid) -> Result<Vec<Order>, AppError> {
    state.store.courier(driver_id)?;
    Ok(state
        .store
        .find_orders(|order| order.is_assigned_to(driver_id) && order.delivery_status.is_active()))
}

/// Offers waiting for the driver's answer.
pub fn driver_requests(state: &AppState, driver_id: Uuid) -> Result<Vec<Order>, AppError> {
    state.store.courier(driver_id)?;
    Ok(state.store.find_orders(|order| {
        order.is_assigned_to(driver_id) && order.delivery_status == DeliveryStatus::DriverAssigned
    }))
}

pub fn delivery_status(state: &AppState, order_id: Uuid) -> Result<DeliveryStatusView, AppError> {
    let order = state.store.order(order_id)?;

    Ok(DeliveryStatusView {
        order_id: order.id,
        delivery_status: order.delivery_status,
        payment_status: order.payment_status,
        driver_id: order.assigned_courier,
        pickup_code_sent: order.pickup_code.is_some(),
        picked_up: order.pickup_code.as_ref().is_some_and(VerificationCode::is_consumed),
        delivery_code_sent: order.delivery_code.is_some(),
        delivered: order.delivery_status == DeliveryStatus::Delivered,
        status_history: order.status_history,
    })
}

/// Route from the driver's position through every business still to visit,
/// then every drop-off. Pickups are ordered first, deliveries second.
pub async fn plan_driver_route(state: &AppState, driver_id: Uuid) -> Result<PlannedRoute, AppError> {
    let driver = state.store.courier(driver_id)?;
    let origin = driver
        .valid_location()
        .ok_or_else(|| AppError::Validation(format!("driver {driver_id} has no location")))?;
    let orders = state
        .store
        .find_orders(|order| order.is_assigned_to(driver_id) && order.delivery_status.is_active());

    let mut visited = HashSet::new();
    let pickups: Vec<RouteStop> = orders
        .iter()
        .filter(|order| order.delivery_status.awaits_pickup())
        .filter_map(|order| {
            let location = order.business.valid_location()?;
            visited.insert(order.business.id).then(|| {
                RouteStop::new(
                    StopKind::Pickup,
                    location,
                    Some(order.business.id),
                    order.business.name.clone(),
                )
            })
        })
        .collect();

    let drop_offs: Vec<RouteStop> = orders
        .iter()
        .filter_map(|order| {
            order.delivery_address.valid_location().map(|location| {
                RouteStop::new(
                    StopKind::Delivery,
                    location,
                    Some(order.id),
                    order.delivery_address.street.clone(),
                )
            })
        })
        .collect();

    let start = RouteStop::new(StopKind::Start, origin, Some(driver.id), driver.name.clone());
    if pickups.is_empty() {
        return Ok(state.planner.plan(start, drop_offs, None).await);
    }

    let collection = state.planner.plan(start, pickups, None).await;
    let Some(last_pickup) = collection.stops.last().cloned() else {
        return Ok(collection);
    };
    let distribution = state.planner.plan(last_pickup, drop_offs, None).await;

    Ok(collection.then(distribution))
}

/// Walks the ranked drivers and offers the order to the first one whose
/// current load allows it. Must be called with the order lock held.
async fn dispatch(state: &AppState, order: &mut Order) -> DriverAssignment {
    let Some(pickup) = order.business.valid_location() else {
        state.store.save_order(order.clone());
        return no_candidate(state, order, "pickup location is unknown");
    };

    let started = Instant::now();
    let drivers = state.store.find_couriers(|courier| courier.role == CourierRole::Driver);
    let ranked = rank_drivers(
        &pickup,
        order.required_capacity,
        &drivers,
        &order.declined_by,
        state.settings.driver_candidate_limit,
    );
    state
        .metrics
        .ranking_latency_seconds
        .with_label_values(&["order"])
        .observe(started.elapsed().as_secs_f64());

    for candidate in &ranked {
        let _driver_guard = state.locks.acquire(candidate.courier_id).await;
        let active = state.store.find_orders(|other| {
            other.id != order.id
                && other.is_assigned_to(candidate.courier_id)
                && other.delivery_status.is_active()
        });

        if !driver_can_take(
            &active,
            order,
            state.settings.consolidation_radius_km,
            state.settings.max_orders_per_driver,
        ) {
            debug!(
                order_id = %order.id,
                driver_id = %candidate.courier_id,
                active = active.len(),
                "driver cannot consolidate order"
            );
            continue;
        }

        let now = state.clock.now();
        order.assigned_courier = Some(candidate.courier_id);
        order.assignment_expires_at = Some(now + state.settings.order_timeout);
        order.advance(DeliveryStatus::DriverAssigned, Actor::System, now);
        state.store.save_order(order.clone());

        if let Err(err) = state.store.update_courier(candidate.courier_id, |driver| {
            driver.active_assignments += 1;
            driver.updated_at = now;
        }) {
            warn!(driver_id = %candidate.courier_id, error = %err, "driver bookkeeping skipped");
        }

        state.metrics.transition("order", "driver_assigned");
        state.metrics.pending_requests.inc();
        state
            .metrics
            .assignment_outcomes_total
            .with_label_values(&["order", "assigned"])
            .inc();
        state.notify(
            candidate.courier_id,
            NotificationCategory::AssignmentRequest,
            format!("New delivery request for order {}", order.id),
            Some(json!({ "order_id": order.id })),
        );
        info!(
            order_id = %order.id,
            driver_id = %candidate.courier_id,
            distance_km = candidate.distance_km,
            consolidated = !active.is_empty(),
            "driver requested for order"
        );

        return DriverAssignment::Assigned {
            order_id: order.id,
            driver_id: candidate.courier_id,
            distance_km: candidate.distance_km,
            consolidated: !active.is_empty(),
        };
    }

    state.store.save_order(order.clone());
    let reason = if ranked.is_empty() {
        "no eligible drivers"
    } else {
        "no driver can take this order alongside their current deliveries"
    };
    no_candidate(state, order, reason)
}

fn no_candidate(state: &AppState, order: &Order, reason: &str) -> DriverAssignment {
    state
        .metrics
        .assignment_outcomes_total
        .with_label_values(&["order", "no_candidate"])
        .inc();
    warn!(order_id = %order.id, reason, "order left waiting for a driver");

    DriverAssignment::NoCandidate {
        order_id: order.id,
        reason: reason.to_string(),
    }
}

fn release_driver(state: &AppState, order: &mut Order, driver_id: Uuid, event: OrderEvent, actor: Actor) {
    let now = state.clock.now();
    order.add_declined(driver_id);
    order.assigned_courier = None;
    order.assignment_expires_at = None;
    order.record(event, actor, now);
    order.advance(DeliveryStatus::WaitingForDriver, Actor::System, now);
    state.store.save_order(order.clone());

    if let Err(err) = state.store.update_courier(driver_id, |driver| {
        driver.active_assignments = driver.active_assignments.saturating_sub(1);
        if driver.active_assignments == 0 {
            driver.status = CourierStatus::Available;
        }
        driver.updated_at = now;
    }) {
        warn!(driver_id = %driver_id, error = %err, "driver bookkeeping skipped");
    }
    state.metrics.pending_requests.dec();
}

fn ensure_driver(order: &Order, driver_id: Uuid) -> Result<(), AppError> {
    if order.is_assigned_to(driver_id) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!(
            "driver {driver_id} is not assigned to order {}",
            order.id
        )))
    }
}

fn ensure_status(order: &Order, expected: DeliveryStatus) -> Result<(), AppError> {
    if order.delivery_status == expected {
        Ok(())
    } else {
        Err(AppError::InvalidState(format!(
            "order {} is {:?}, expected {:?}",
            order.id, order.delivery_status, expected
        )))
    }
}
