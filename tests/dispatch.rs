use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc, Weekday};
use mockall::mock;
use pickup_dispatch::clock::{Clock, ManualClock};
use pickup_dispatch::config::DispatchSettings;
use pickup_dispatch::engine::batches::{
    accept_batch_assignment, assign_volunteer_to_batch, auto_assign_volunteers,
    decline_batch_assignment, generate_batches, plan_batch_route,
};
use pickup_dispatch::engine::orders::{
    NewOrder, accept_delivery, assign_driver_to_order, create_order, reclaim_order,
    reject_delivery,
};
use pickup_dispatch::engine::sweeper::sweep_once;
use pickup_dispatch::error::AppError;
use pickup_dispatch::models::assignment::{BatchGeneration, DriverAssignment, VolunteerAssignment};
use pickup_dispatch::models::batch::BatchStatus;
use pickup_dispatch::models::campaign::Campaign;
use pickup_dispatch::models::capacity::Capacity;
use pickup_dispatch::models::courier::{
    Courier, CourierRole, CourierStatus, GeoPoint, TimeWindow, WeeklyAvailability,
};
use pickup_dispatch::models::item::{AssignmentStatus, Item, ItemStatus, Site};
use pickup_dispatch::models::notification::{Notification, NotificationCategory};
use pickup_dispatch::models::order::{DeliveryAddress, DeliveryStatus, PaymentStatus};
use pickup_dispatch::notify::{NotificationPublisher, PublishError};
use pickup_dispatch::routing::direct::DirectLineRouteService;
use pickup_dispatch::routing::{RouteLeg, RouteService, RoutingError};
use pickup_dispatch::state::AppState;
use uuid::Uuid;

mock! {
    Publisher {}

    impl NotificationPublisher for Publisher {
        fn publish(&self, notification: &Notification) -> Result<(), PublishError>;
    }
}

mock! {
    Routes {}

    #[async_trait]
    impl RouteService for Routes {
        async fn leg(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteLeg, RoutingError>;
        async fn optimize(
            &self,
            start: GeoPoint,
            stops: Vec<GeoPoint>,
            end: Option<GeoPoint>,
        ) -> Result<Vec<usize>, RoutingError>;
    }
}

/// Monday 10:00 UTC.
fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

fn state_with_clock(clock: Arc<ManualClock>) -> AppState {
    AppState::new(
        DispatchSettings::default(),
        64,
        Arc::new(DirectLineRouteService),
        clock,
    )
}

fn every_day() -> WeeklyAvailability {
    let window = TimeWindow::parse("00:00", "23:59").unwrap();
    [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ]
    .into_iter()
    .map(|day| (day, vec![window.clone()]))
    .collect::<HashMap<_, _>>()
}

fn add_courier(state: &AppState, role: CourierRole, lat: f64, lng: f64, capacity: Capacity) -> Uuid {
    let courier = Courier {
        id: Uuid::new_v4(),
        name: format!("{role:?} at {lat},{lng}"),
        role,
        location: Some(GeoPoint::new(lat, lng)),
        capacity,
        availability: every_day(),
        status: CourierStatus::Available,
        active_assignments: 0,
        completed_deliveries: 0,
        updated_at: state.clock.now(),
    };
    let id = courier.id;
    state.store.save_courier(courier);
    id
}

fn site(lat: f64, lng: f64) -> Site {
    Site {
        id: Uuid::new_v4(),
        name: format!("site {lat},{lng}"),
        location: Some(GeoPoint::new(lat, lng)),
    }
}

fn add_campaign(state: &AppState, volunteers: Vec<Uuid>) -> Uuid {
    let campaign = Campaign {
        id: Uuid::new_v4(),
        name: "Winter coats".to_string(),
        organizer: site(10.05, 10.05),
        volunteers,
        created_at: state.clock.now(),
    };
    let id = campaign.id;
    state.store.save_campaign(campaign);
    id
}

fn add_item(state: &AppState, campaign_id: Uuid, business: &Site, size: Capacity) -> Uuid {
    let item = Item {
        id: Uuid::new_v4(),
        campaign_id,
        name: "Coat".to_string(),
        business: business.clone(),
        size,
        status: ItemStatus::Pending,
        assignment_status: None,
        assigned_courier: None,
        picked_up_at: None,
        delivered_at: None,
        created_at: state.clock.now(),
    };
    let id = item.id;
    state.store.save_item(item);
    id
}

fn add_order(state: &AppState, pickup: (f64, f64), drop_off: (f64, f64)) -> Uuid {
    let order = create_order(
        state,
        NewOrder {
            buyer_id: Uuid::new_v4(),
            sale_item_id: Uuid::new_v4(),
            business: site(pickup.0, pickup.1),
            quantity: 1,
            required_capacity: Capacity::Small,
            delivery_address: DeliveryAddress {
                street: "2 High St".to_string(),
                city: "Town".to_string(),
                location: Some(GeoPoint::new(drop_off.0, drop_off.1)),
            },
            payment_status: PaymentStatus::Paid,
        },
    )
    .unwrap();
    order.id
}

/// One volunteer, one campaign with two items from the same business, and
/// the single generated batch already requested from that volunteer.
async fn requested_batch(state: &AppState) -> (Uuid, Uuid, Vec<Uuid>) {
    let volunteer = add_courier(state, CourierRole::Volunteer, 10.0, 10.0, Capacity::Large);
    let campaign_id = add_campaign(state, vec![volunteer]);
    let business = site(10.0, 10.0);
    let items = vec![
        add_item(state, campaign_id, &business, Capacity::Small),
        add_item(state, campaign_id, &business, Capacity::Medium),
    ];

    let BatchGeneration::Created { batches } = generate_batches(state, campaign_id).await.unwrap() else {
        panic!("expected batches to be created");
    };
    assert_eq!(batches.len(), 1);

    let outcomes = auto_assign_volunteers(state, campaign_id).await.unwrap();
    assert!(matches!(outcomes[0], VolunteerAssignment::Assigned { courier_id, .. } if courier_id == volunteer));

    (batches[0].id, volunteer, items)
}

#[tokio::test]
async fn stale_batch_request_is_reclaimed_after_timeout() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock.clone());
    let (batch_id, volunteer, items) = requested_batch(&state).await;

    clock.advance(Duration::minutes(16));
    let report = sweep_once(&state).await;
    assert_eq!(report.batches_reclaimed, 1);

    let batch = state.store.batch(batch_id).unwrap();
    assert_eq!(batch.status, BatchStatus::Suggested);
    assert_eq!(batch.assignment_status, None);
    assert_eq!(batch.assigned_courier, None);

    for item in state.store.items_by_ids(&items) {
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.assignment_status, None);
        assert_eq!(item.assigned_courier, None);
    }

    let inbox = state.store.notifications_for(volunteer);
    assert!(
        inbox
            .iter()
            .any(|notification| notification.category == NotificationCategory::AssignmentTimeout)
    );
}

#[tokio::test]
async fn sweeping_twice_reclaims_once() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock.clone());
    requested_batch(&state).await;

    clock.advance(Duration::minutes(16));
    assert_eq!(sweep_once(&state).await.batches_reclaimed, 1);
    assert_eq!(sweep_once(&state).await.batches_reclaimed, 0);
}

#[tokio::test]
async fn fresh_batch_request_survives_sweep() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock.clone());
    let (batch_id, _, _) = requested_batch(&state).await;

    clock.advance(Duration::minutes(10));
    assert_eq!(sweep_once(&state).await.batches_reclaimed, 0);
    assert_eq!(state.store.batch(batch_id).unwrap().status, BatchStatus::Requested);
}

#[tokio::test]
async fn accepting_a_reclaimed_request_fails() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock.clone());
    let (batch_id, volunteer, _) = requested_batch(&state).await;

    clock.advance(Duration::minutes(16));
    sweep_once(&state).await;

    assert!(accept_batch_assignment(&state, batch_id, volunteer).await.is_err());
    assert_eq!(state.store.courier(volunteer).unwrap().active_assignments, 0);
}

#[tokio::test]
async fn batch_decisions_cascade_to_items() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock);
    let (batch_id, volunteer, items) = requested_batch(&state).await;

    for item in state.store.items_by_ids(&items) {
        assert_eq!(item.status, ItemStatus::Requested);
        assert_eq!(item.assignment_status, Some(AssignmentStatus::Pending));
    }

    let batch = decline_batch_assignment(&state, batch_id, volunteer).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Suggested);
    assert_eq!(batch.assignment_status, Some(AssignmentStatus::Declined));
    for item in state.store.items_by_ids(&items) {
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.assignment_status, None);
    }
}

#[tokio::test]
async fn accepted_batch_marks_items_assigned() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock);
    let (batch_id, volunteer, items) = requested_batch(&state).await;

    let batch = accept_batch_assignment(&state, batch_id, volunteer).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Assigned);
    for item in state.store.items_by_ids(&items) {
        assert_eq!(item.status, ItemStatus::Assigned);
        assert_eq!(item.assignment_status, Some(AssignmentStatus::Accepted));
        assert_eq!(item.assigned_courier, Some(volunteer));
    }
    assert_eq!(state.store.courier(volunteer).unwrap().active_assignments, 1);
}

#[tokio::test]
async fn auto_assign_proposes_each_volunteer_once_per_run() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock);
    let volunteer = add_courier(&state, CourierRole::Volunteer, 10.0, 10.0, Capacity::Large);
    let campaign_id = add_campaign(&state, vec![volunteer]);

    let north = site(10.0, 10.0);
    let south = site(-10.0, -10.0);
    for business in [&north, &north, &south, &south] {
        add_item(&state, campaign_id, business, Capacity::Small);
    }

    let BatchGeneration::Created { batches } = generate_batches(&state, campaign_id).await.unwrap() else {
        panic!("expected batches to be created");
    };
    assert_eq!(batches.len(), 2);

    let outcomes = auto_assign_volunteers(&state, campaign_id).await.unwrap();
    let assigned = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, VolunteerAssignment::Assigned { .. }))
        .count();
    let unmatched = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, VolunteerAssignment::NoCandidate { .. }))
        .count();
    assert_eq!(assigned, 1);
    assert_eq!(unmatched, 1);
}

#[tokio::test]
async fn regenerating_keeps_items_of_requested_batches() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock);
    let (batch_id, _, _) = requested_batch(&state).await;
    let campaign_id = state.store.batch(batch_id).unwrap().campaign_id;

    let outcome = generate_batches(&state, campaign_id).await.unwrap();
    assert!(matches!(outcome, BatchGeneration::NothingToBatch));
    assert_eq!(state.store.batch(batch_id).unwrap().status, BatchStatus::Requested);
}

#[tokio::test]
async fn declined_drivers_are_never_proposed_again() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock);
    let first = add_courier(&state, CourierRole::Driver, 0.0, 0.001, Capacity::Small);
    let second = add_courier(&state, CourierRole::Driver, 0.0, 0.002, Capacity::Small);
    let order_id = add_order(&state, (0.0, 0.0), (0.0, 0.05));

    let offer = assign_driver_to_order(&state, order_id, None, None).await.unwrap();
    assert_eq!(offer.driver_id(), Some(first));

    let offer = reject_delivery(&state, order_id, first).await.unwrap();
    assert_eq!(offer.driver_id(), Some(second));

    let offer = reject_delivery(&state, order_id, second).await.unwrap();
    assert!(matches!(offer, DriverAssignment::NoCandidate { .. }));

    state
        .store
        .update_courier(first, |driver| driver.location = Some(GeoPoint::new(0.0, 0.0)))
        .unwrap();
    let offer = assign_driver_to_order(&state, order_id, None, None).await.unwrap();
    assert!(matches!(offer, DriverAssignment::NoCandidate { .. }));

    let order = state.store.order(order_id).unwrap();
    assert_eq!(order.delivery_status, DeliveryStatus::WaitingForDriver);
    assert!(order.has_declined(first));
    assert!(order.has_declined(second));
    assert_eq!(state.store.courier(first).unwrap().active_assignments, 0);
}

#[tokio::test]
async fn overdue_order_offer_moves_to_next_driver() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock.clone());
    let first = add_courier(&state, CourierRole::Driver, 0.0, 0.001, Capacity::Small);
    let second = add_courier(&state, CourierRole::Driver, 0.0, 0.002, Capacity::Small);
    let order_id = add_order(&state, (0.0, 0.0), (0.0, 0.05));

    assign_driver_to_order(&state, order_id, None, None).await.unwrap();

    clock.advance(Duration::seconds(90));
    assert_eq!(sweep_once(&state).await.orders_reclaimed, 0);

    clock.advance(Duration::seconds(60));
    assert_eq!(sweep_once(&state).await.orders_reclaimed, 1);

    let order = state.store.order(order_id).unwrap();
    assert_eq!(order.assigned_courier, Some(second));
    assert_eq!(order.delivery_status, DeliveryStatus::DriverAssigned);
    assert!(order.has_declined(first));
    assert_eq!(state.store.courier(first).unwrap().active_assignments, 0);
    assert!(
        state
            .store
            .notifications_for(first)
            .iter()
            .any(|notification| notification.category == NotificationCategory::AssignmentTimeout)
    );
}

#[tokio::test]
async fn nearby_orders_consolidate_onto_one_driver() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock);
    let driver = add_courier(&state, CourierRole::Driver, 0.0, 0.0, Capacity::Small);

    let first = add_order(&state, (0.0, 0.0), (0.0, 1.0));
    assign_driver_to_order(&state, first, None, None).await.unwrap();
    accept_delivery(&state, first, driver).await.unwrap();
    assert_eq!(state.store.courier(driver).unwrap().status, CourierStatus::Busy);

    let second = add_order(&state, (0.0, 0.001), (0.0, 1.001));
    let offer = assign_driver_to_order(&state, second, None, None).await.unwrap();
    assert!(matches!(
        offer,
        DriverAssignment::Assigned { driver_id, consolidated: true, .. } if driver_id == driver
    ));

    let third = add_order(&state, (0.0, 0.0005), (0.0, 1.0005));
    let offer = assign_driver_to_order(&state, third, None, None).await.unwrap();
    assert!(matches!(offer, DriverAssignment::NoCandidate { .. }));
}

#[tokio::test]
async fn distant_order_is_not_consolidated() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock);
    let driver = add_courier(&state, CourierRole::Driver, 0.0, 0.0, Capacity::Small);

    let first = add_order(&state, (0.0, 0.0), (0.0, 1.0));
    assign_driver_to_order(&state, first, None, None).await.unwrap();
    accept_delivery(&state, first, driver).await.unwrap();

    let far = add_order(&state, (0.0, 0.0), (0.0, 2.0));
    let offer = assign_driver_to_order(&state, far, None, None).await.unwrap();
    assert!(matches!(offer, DriverAssignment::NoCandidate { .. }));
}

#[tokio::test]
async fn failed_publish_keeps_the_transition() {
    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .returning(|_| Err(PublishError::Failed("socket closed".to_string())));

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(monday_morning()));
    let state = AppState::with_publisher(
        DispatchSettings::default(),
        16,
        Arc::new(publisher),
        Arc::new(DirectLineRouteService),
        clock,
    );
    let driver = add_courier(&state, CourierRole::Driver, 0.0, 0.001, Capacity::Small);
    let order_id = add_order(&state, (0.0, 0.0), (0.0, 0.05));

    let offer = assign_driver_to_order(&state, order_id, None, None).await.unwrap();
    assert_eq!(offer.driver_id(), Some(driver));
    assert_eq!(
        state.store.order(order_id).unwrap().delivery_status,
        DeliveryStatus::DriverAssigned
    );
    assert_eq!(state.store.notifications_for(driver).len(), 1);
}

#[tokio::test]
async fn unreachable_routing_falls_back_to_direct_legs() {
    let mut routes = MockRoutes::new();
    routes
        .expect_leg()
        .returning(|_, _| Err(RoutingError::Unavailable("503".to_string())));
    routes
        .expect_optimize()
        .returning(|_, _, _| Err(RoutingError::Unavailable("503".to_string())));

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(monday_morning()));
    let state = AppState::new(DispatchSettings::default(), 16, Arc::new(routes), clock);
    let (batch_id, volunteer, _) = requested_batch(&state).await;
    accept_batch_assignment(&state, batch_id, volunteer).await.unwrap();

    let route = plan_batch_route(&state, batch_id).await.unwrap();
    assert!(route.direct_mode);
    assert_eq!(route.legs.len(), route.stops.len() - 1);
    assert!(route.total_distance_km > 0.0);
    assert!(
        state
            .metrics
            .routing_fallbacks_total
            .with_label_values(&["leg"])
            .get()
            >= 1
    );
}

#[tokio::test]
async fn drivers_cannot_be_assigned_to_batches() {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let state = state_with_clock(clock);
    let volunteer = add_courier(&state, CourierRole::Volunteer, 10.0, 10.0, Capacity::Large);
    let driver = add_courier(&state, CourierRole::Driver, 10.0, 10.0, Capacity::Large);
    let campaign_id = add_campaign(&state, vec![volunteer]);
    add_item(&state, campaign_id, &site(10.0, 10.0), Capacity::Small);

    let BatchGeneration::Created { batches } = generate_batches(&state, campaign_id).await.unwrap() else {
        panic!("expected batches to be created");
    };

    let result = assign_volunteer_to_batch(&state, batches[0].id, driver).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(state.store.batch(batches[0].id).unwrap().status, BatchStatus::Suggested);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_batch_decisions_settle_on_one_outcome() {
    for _ in 0..25 {
        let clock = Arc::new(ManualClock::new(monday_morning()));
        let state = Arc::new(state_with_clock(clock.clone()));
        let (batch_id, volunteer, items) = requested_batch(&state).await;
        clock.advance(Duration::minutes(16));

        let accept = tokio::spawn({
            let state = state.clone();
            async move { accept_batch_assignment(&state, batch_id, volunteer).await.is_ok() }
        });
        let decline = tokio::spawn({
            let state = state.clone();
            async move { decline_batch_assignment(&state, batch_id, volunteer).await.is_ok() }
        });
        let sweep = tokio::spawn({
            let state = state.clone();
            async move { sweep_once(&state).await.batches_reclaimed }
        });

        let accepted = accept.await.unwrap();
        let declined = decline.await.unwrap();
        let reclaimed = sweep.await.unwrap();
        assert_eq!(usize::from(accepted) + usize::from(declined) + reclaimed, 1);

        let batch = state.store.batch(batch_id).unwrap();
        let (batch_status, item_status, item_assignment) = if accepted {
            (BatchStatus::Assigned, ItemStatus::Assigned, Some(AssignmentStatus::Accepted))
        } else {
            (BatchStatus::Suggested, ItemStatus::Pending, None)
        };
        assert_eq!(batch.status, batch_status);
        for item in state.store.items_by_ids(&items) {
            assert_eq!(item.status, item_status);
            assert_eq!(item.assignment_status, item_assignment);
        }
        assert_eq!(
            state.store.courier(volunteer).unwrap().active_assignments,
            u32::from(accepted)
        );
        assert!(state.locks.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_accept_and_timeout_settle_on_one_driver() {
    for _ in 0..25 {
        let clock = Arc::new(ManualClock::new(monday_morning()));
        let state = Arc::new(state_with_clock(clock.clone()));
        let first = add_courier(&state, CourierRole::Driver, 0.0, 0.001, Capacity::Small);
        let second = add_courier(&state, CourierRole::Driver, 0.0, 0.002, Capacity::Small);
        let order_id = add_order(&state, (0.0, 0.0), (0.0, 0.05));
        assign_driver_to_order(&state, order_id, None, None).await.unwrap();
        clock.advance(Duration::minutes(3));

        let accept = tokio::spawn({
            let state = state.clone();
            async move { accept_delivery(&state, order_id, first).await.is_ok() }
        });
        let reclaim = tokio::spawn({
            let state = state.clone();
            async move { matches!(reclaim_order(&state, order_id).await, Ok(Some(_))) }
        });

        let accepted = accept.await.unwrap();
        let reclaimed = reclaim.await.unwrap();
        assert!(accepted != reclaimed);

        let order = state.store.order(order_id).unwrap();
        if accepted {
            assert_eq!(order.delivery_status, DeliveryStatus::PickupReady);
            assert_eq!(order.assigned_courier, Some(first));
            assert!(!order.has_declined(first));
            assert_eq!(state.store.courier(first).unwrap().active_assignments, 1);
        } else {
            assert_eq!(order.delivery_status, DeliveryStatus::DriverAssigned);
            assert_eq!(order.assigned_courier, Some(second));
            assert!(order.has_declined(first));
            assert_eq!(state.store.courier(first).unwrap().active_assignments, 0);
        }
        assert!(state.locks.is_empty());
    }
}
