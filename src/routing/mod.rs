pub mod direct;
pub mod ors;
pub mod planner;
pub mod retry;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::courier::GeoPoint;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routing service unavailable: {0}")]
    Unavailable(String),

    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected routing response: {0}")]
    BadResponse(String),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl RoutingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RoutingError::Unavailable(_) | RoutingError::Http(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteLeg {
    pub from: GeoPoint,
    pub to: GeoPoint,
    pub distance_km: f64,
    pub duration_min: f64,
}

/// Point-to-point routing plus stop-order optimization.
#[async_trait]
pub trait RouteService: Send + Sync {
    async fn leg(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteLeg, RoutingError>;

    /// Visiting order of `stops`, as indices into `stops`, for a trip that
    /// begins at `start` and optionally finishes at `end`.
    async fn optimize(
        &self,
        start: GeoPoint,
        stops: Vec<GeoPoint>,
        end: Option<GeoPoint>,
    ) -> Result<Vec<usize>, RoutingError>;
}
