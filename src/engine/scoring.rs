use crate::geo::haversine_km;
use crate::models::assignment::ScoreBreakdown;
use crate::models::capacity::Capacity;
use crate::models::courier::{Courier, GeoPoint};

const PROXIMITY_CEILING_KM: f64 = 10.0;
const CAPACITY_CEILING: f64 = 5.0;

/// Scores a volunteer against a batch. Returns the total, the breakdown and
/// the distance to the batch center when the volunteer has a location.
pub fn compute_volunteer_score(
    courier: &Courier,
    center: &GeoPoint,
    required: Capacity,
) -> (f64, ScoreBreakdown, Option<f64>) {
    let distance_km = courier
        .valid_location()
        .map(|location| haversine_km(&location, center));

    let breakdown = ScoreBreakdown {
        proximity_score: distance_km.map(proximity_score).unwrap_or(0.0),
        capacity_score: capacity_score(courier.capacity, required),
    };

    let score = breakdown.proximity_score + breakdown.capacity_score;
    (score, breakdown, distance_km)
}

pub fn proximity_score(distance_km: f64) -> f64 {
    (PROXIMITY_CEILING_KM - distance_km).max(0.0)
}

pub fn capacity_score(courier: Capacity, required: Capacity) -> f64 {
    let gap = (i16::from(courier.rank()) - i16::from(required.rank())).abs();
    CAPACITY_CEILING - f64::from(gap)
}
