use crate::geo::haversine_km;
use crate::models::order::Order;

/// Both pickups and both drop-offs lie within `radius_km` of each other.
/// Orders missing either coordinate never consolidate.
pub fn can_consolidate(current: &Order, candidate: &Order, radius_km: f64) -> bool {
    let (Some(pickup_a), Some(pickup_b)) = (
        current.business.valid_location(),
        candidate.business.valid_location(),
    ) else {
        return false;
    };
    let (Some(drop_a), Some(drop_b)) = (
        current.delivery_address.valid_location(),
        candidate.delivery_address.valid_location(),
    ) else {
        return false;
    };

    haversine_km(&pickup_a, &pickup_b) <= radius_km && haversine_km(&drop_a, &drop_b) <= radius_km
}

/// Whether a driver already carrying `active` orders may also take
/// `candidate`.
pub fn driver_can_take(active: &[Order], candidate: &Order, radius_km: f64, max_orders: u32) -> bool {
    if active.is_empty() {
        return true;
    }
    if active.len() >= max_orders as usize {
        return false;
    }
    active
        .iter()
        .all(|current| can_consolidate(current, candidate, radius_km))
}
