use crate::models::courier::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Points closer than this on both axes (in degrees, roughly ten metres) are
/// treated as the same place.
pub const IDENTICAL_POINT_THRESHOLD_DEG: f64 = 0.0001;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Squared Euclidean distance on raw lat/lng, as used by clustering.
pub fn planar_distance_sq(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = a.lat - b.lat;
    let d_lng = a.lng - b.lng;
    d_lat * d_lat + d_lng * d_lng
}

pub fn centroid(points: &[GeoPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let (lat_sum, lng_sum) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.lat, lng + p.lng));

    Some(GeoPoint {
        lat: lat_sum / n,
        lng: lng_sum / n,
    })
}

pub fn effectively_identical(points: &[GeoPoint]) -> bool {
    let Some(first) = points.first() else {
        return true;
    };

    points.iter().all(|p| {
        (p.lat - first.lat).abs() < IDENTICAL_POINT_THRESHOLD_DEG
            && (p.lng - first.lng).abs() < IDENTICAL_POINT_THRESHOLD_DEG
    })
}
