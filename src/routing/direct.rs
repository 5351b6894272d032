use async_trait::async_trait;

use crate::geo::haversine_km;
use crate::models::courier::GeoPoint;
use crate::routing::{RouteLeg, RouteService, RoutingError};

/// Average urban speed used to turn straight-line distance into a duration.
const DIRECT_SPEED_KMH: f64 = 30.0;

pub fn direct_leg(from: GeoPoint, to: GeoPoint) -> RouteLeg {
    let distance_km = haversine_km(&from, &to);
    RouteLeg {
        from,
        to,
        distance_km,
        duration_min: distance_km / DIRECT_SPEED_KMH * 60.0,
    }
}

/// Straight-line routing. Used when no routing service is configured and as
/// the fallback when the configured one keeps failing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectLineRouteService;

#[async_trait]
impl RouteService for DirectLineRouteService {
    async fn leg(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteLeg, RoutingError> {
        Ok(direct_leg(from, to))
    }

    async fn optimize(
        &self,
        _start: GeoPoint,
        _stops: Vec<GeoPoint>,
        _end: Option<GeoPoint>,
    ) -> Result<Vec<usize>, RoutingError> {
        Err(RoutingError::Unsupported("direct-line routing has no optimizer"))
    }
}

#[cfg(test)]
mod tests {
    use super::direct_leg;
    use crate::models::courier::GeoPoint;

    #[test]
    fn direct_leg_duration_follows_distance() {
        let leg = direct_leg(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.27));
        assert!((leg.distance_km - 30.0).abs() < 0.5);
        assert!((leg.duration_min - 60.0).abs() < 1.0);
    }
}
