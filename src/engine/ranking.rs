use std::collections::HashSet;

use chrono::{DateTime, Datelike, FixedOffset, Utc, Weekday};
use uuid::Uuid;

use crate::engine::scoring::compute_volunteer_score;
use crate::geo::haversine_km;
use crate::models::assignment::{RankedDriver, RankedVolunteer};
use crate::models::capacity::Capacity;
use crate::models::courier::{Courier, CourierRole, GeoPoint};

/// Wall-clock weekday and `HH:MM` used to test availability windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMoment {
    pub weekday: Weekday,
    pub hhmm: String,
}

impl LocalMoment {
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = now.with_timezone(&offset);
        Self {
            weekday: local.weekday(),
            hhmm: local.format("%H:%M").to_string(),
        }
    }
}

/// Eligible volunteers for a batch, best first. Couriers in `excluded`
/// are skipped, as are drivers, couriers with no window covering `moment`
/// and couriers with too little capacity. Equal scores keep roster order.
pub fn rank_volunteers(
    center: &GeoPoint,
    required: Capacity,
    roster: &[Courier],
    excluded: &HashSet<Uuid>,
    moment: &LocalMoment,
) -> Vec<RankedVolunteer> {
    let mut ranked: Vec<RankedVolunteer> = roster
        .iter()
        .filter(|courier| courier.role == CourierRole::Volunteer)
        .filter(|courier| !excluded.contains(&courier.id))
        .filter(|courier| courier.is_available_at(moment.weekday, &moment.hhmm))
        .filter(|courier| courier.capacity.satisfies(required))
        .map(|courier| {
            let (score, score_breakdown, distance_km) = compute_volunteer_score(courier, center, required);
            RankedVolunteer {
                courier_id: courier.id,
                name: courier.name.clone(),
                distance_km,
                score,
                score_breakdown,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Nearest eligible drivers to `pickup`, at most `limit` of them. Drivers
/// that declined the order or have no usable location are skipped; ties on
/// distance prefer the driver with fewer active assignments.
pub fn rank_drivers(
    pickup: &GeoPoint,
    required: Capacity,
    drivers: &[Courier],
    declined_by: &[Uuid],
    limit: usize,
) -> Vec<RankedDriver> {
    let mut ranked: Vec<RankedDriver> = drivers
        .iter()
        .filter(|driver| !declined_by.contains(&driver.id))
        .filter(|driver| driver.capacity.satisfies(required))
        .filter_map(|driver| {
            let location = driver.valid_location()?;
            Some(RankedDriver {
                courier_id: driver.id,
                distance_km: haversine_km(&location, pickup),
                active_assignments: driver.active_assignments,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then(a.active_assignments.cmp(&b.active_assignments))
    });
    ranked.truncate(limit);
    ranked
}
