use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use crate::config::RoutingConfig;
use crate::models::courier::GeoPoint;
use crate::routing::{RouteLeg, RouteService, RoutingError};

/// Client for an openrouteservice-compatible HTTP API.
pub struct OrsRouteService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    profile: String,
}

#[derive(Serialize)]
struct DirectionsRequest {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Deserialize)]
struct DirectionsRoute {
    summary: RouteSummary,
}

#[derive(Deserialize)]
struct RouteSummary {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

#[derive(Serialize)]
struct OptimizationRequest {
    jobs: Vec<OptimizationJob>,
    vehicles: Vec<OptimizationVehicle>,
}

#[derive(Serialize)]
struct OptimizationJob {
    id: usize,
    location: [f64; 2],
}

#[derive(Serialize)]
struct OptimizationVehicle {
    id: usize,
    profile: String,
    start: [f64; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<[f64; 2]>,
}

#[derive(Deserialize)]
struct OptimizationResponse {
    #[serde(default)]
    routes: Vec<OptimizationRoute>,
}

#[derive(Deserialize)]
struct OptimizationRoute {
    #[serde(default)]
    steps: Vec<OptimizationStep>,
}

#[derive(Deserialize)]
struct OptimizationStep {
    #[serde(rename = "type")]
    kind: String,
    job: Option<usize>,
}

fn lng_lat(point: GeoPoint) -> [f64; 2] {
    [point.lng, point.lat]
}

impl OrsRouteService {
    pub fn new(config: &RoutingConfig, api_key: String) -> Result<Self, RoutingError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            profile: config.profile.clone(),
        })
    }

    async fn post<B, R>(&self, url: String, body: &B) -> Result<R, RoutingError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(RoutingError::Unavailable(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            return Err(RoutingError::BadResponse(format!("{url} returned {status}")));
        }

        Ok(response.json::<R>().await?)
    }
}

#[async_trait]
impl RouteService for OrsRouteService {
    async fn leg(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteLeg, RoutingError> {
        let url = format!("{}/v2/directions/{}", self.base_url, self.profile);
        let body = DirectionsRequest {
            coordinates: vec![lng_lat(from), lng_lat(to)],
        };

        let parsed: DirectionsResponse = self.post(url, &body).await?;
        let route = parsed
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| RoutingError::BadResponse("no route between points".to_string()))?;

        Ok(RouteLeg {
            from,
            to,
            distance_km: route.summary.distance / 1000.0,
            duration_min: route.summary.duration / 60.0,
        })
    }

    async fn optimize(
        &self,
        start: GeoPoint,
        stops: Vec<GeoPoint>,
        end: Option<GeoPoint>,
    ) -> Result<Vec<usize>, RoutingError> {
        let url = format!("{}/optimization", self.base_url);
        let body = OptimizationRequest {
            jobs: stops
                .iter()
                .enumerate()
                .map(|(index, point)| OptimizationJob {
                    id: index + 1,
                    location: lng_lat(*point),
                })
                .collect(),
            vehicles: vec![OptimizationVehicle {
                id: 1,
                profile: self.profile.clone(),
                start: lng_lat(start),
                end: end.map(lng_lat),
            }],
        };

        let parsed: OptimizationResponse = self.post(url, &body).await?;
        let route = parsed
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| RoutingError::BadResponse("optimizer returned no route".to_string()))?;

        let order: Vec<usize> = route
            .steps
            .iter()
            .filter(|step| step.kind == "job")
            .filter_map(|step| step.job)
            .filter(|job| *job >= 1 && *job <= stops.len())
            .map(|job| job - 1)
            .collect();

        if order.len() != stops.len() {
            return Err(RoutingError::BadResponse(format!(
                "optimizer scheduled {} of {} stops",
                order.len(),
                stops.len()
            )));
        }

        Ok(order)
    }
}
