use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::warn;

use crate::models::courier::GeoPoint;
use crate::routing::{RouteLeg, RouteService, RoutingError};

/// Retries transient failures of the wrapped service with exponential
/// backoff, up to `max_attempts` calls in total.
pub struct RetryingRouteService {
    inner: Arc<dyn RouteService>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl RetryingRouteService {
    pub fn new(inner: Arc<dyn RouteService>, max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[async_trait]
impl RouteService for RetryingRouteService {
    async fn leg(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteLeg, RoutingError> {
        let mut attempt = 1;
        loop {
            match self.inner.leg(from, to).await {
                Ok(leg) => return Ok(leg),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, error = %err, "route leg failed; retrying");
                    sleep(self.backoff_for(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn optimize(
        &self,
        start: GeoPoint,
        stops: Vec<GeoPoint>,
        end: Option<GeoPoint>,
    ) -> Result<Vec<usize>, RoutingError> {
        let mut attempt = 1;
        loop {
            match self.inner.optimize(start, stops.clone(), end).await {
                Ok(order) => return Ok(order),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, error = %err, "route optimization failed; retrying");
                    sleep(self.backoff_for(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::RetryingRouteService;
    use crate::models::courier::GeoPoint;
    use crate::routing::direct::direct_leg;
    use crate::routing::{RouteLeg, RouteService, RoutingError};

    struct Flaky {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RouteService for Flaky {
        async fn leg(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteLeg, RoutingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(RoutingError::Unavailable("503".to_string()));
            }
            Ok(direct_leg(from, to))
        }

        async fn optimize(
            &self,
            _start: GeoPoint,
            _stops: Vec<GeoPoint>,
            _end: Option<GeoPoint>,
        ) -> Result<Vec<usize>, RoutingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RoutingError::BadResponse("malformed".to_string()))
        }
    }

    fn flaky(failures: u32) -> Arc<Flaky> {
        Arc::new(Flaky {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let inner = flaky(2);
        let service = RetryingRouteService::new(inner.clone(), 3, Duration::from_millis(1));

        let leg = service
            .leg(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01))
            .await;

        assert!(leg.is_ok());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let inner = flaky(10);
        let service = RetryingRouteService::new(inner.clone(), 3, Duration::from_millis(1));

        let leg = service
            .leg(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01))
            .await;

        assert!(matches!(leg, Err(RoutingError::Unavailable(_))));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let inner = flaky(0);
        let service = RetryingRouteService::new(inner.clone(), 5, Duration::from_millis(1));

        let order = service
            .optimize(GeoPoint::new(0.0, 0.0), vec![GeoPoint::new(0.0, 0.01)], None)
            .await;

        assert!(matches!(order, Err(RoutingError::BadResponse(_))));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
