use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::geo::{effectively_identical, haversine_km};
use crate::models::courier::GeoPoint;
use crate::observability::metrics::Metrics;
use crate::routing::direct::direct_leg;
use crate::routing::{RouteLeg, RouteService};

/// Up to this many points (start, stops and end together) every stop order
/// is tried; beyond it the remote optimizer is asked.
const EXHAUSTIVE_SEARCH_MAX_POINTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Start,
    Pickup,
    Delivery,
    End,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteStop {
    pub kind: StopKind,
    pub location: GeoPoint,
    /// Entity this stop serves: a business, order or campaign.
    pub reference: Option<Uuid>,
    pub label: String,
}

impl RouteStop {
    pub fn new(kind: StopKind, location: GeoPoint, reference: Option<Uuid>, label: impl Into<String>) -> Self {
        Self {
            kind,
            location,
            reference,
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedRoute {
    pub stops: Vec<RouteStop>,
    pub legs: Vec<RouteLeg>,
    pub total_distance_km: f64,
    pub total_duration_min: f64,
    /// Set when some or all legs are straight-line estimates.
    pub direct_mode: bool,
}

impl PlannedRoute {
    fn from_legs(stops: Vec<RouteStop>, legs: Vec<RouteLeg>, direct_mode: bool) -> Self {
        let total_distance_km = legs.iter().map(|leg| leg.distance_km).sum();
        let total_duration_min = legs.iter().map(|leg| leg.duration_min).sum();
        Self {
            stops,
            legs,
            total_distance_km,
            total_duration_min,
            direct_mode,
        }
    }

    /// Appends `next`, whose first stop repeats this route's last one.
    pub fn then(mut self, next: PlannedRoute) -> Self {
        if next.stops.len() <= 1 {
            return self;
        }
        self.stops.extend(next.stops.into_iter().skip(1));
        self.legs.extend(next.legs);
        self.total_distance_km += next.total_distance_km;
        self.total_duration_min += next.total_duration_min;
        self.direct_mode |= next.direct_mode;
        self
    }
}

/// Orders stops and prices the resulting legs, degrading to straight-line
/// estimates whenever the routing service cannot answer.
#[derive(Clone)]
pub struct RoutePlanner {
    service: Arc<dyn RouteService>,
    metrics: Metrics,
}

struct LegCache<'a> {
    service: &'a dyn RouteService,
    points: &'a [GeoPoint],
    legs: HashMap<(usize, usize), RouteLeg>,
    degraded: bool,
}

impl<'a> LegCache<'a> {
    fn new(service: &'a dyn RouteService, points: &'a [GeoPoint]) -> Self {
        Self {
            service,
            points,
            legs: HashMap::new(),
            degraded: false,
        }
    }

    async fn get(&mut self, from: usize, to: usize) -> RouteLeg {
        if let Some(leg) = self.legs.get(&(from, to)) {
            return *leg;
        }

        let (a, b) = (self.points[from], self.points[to]);
        let leg = if self.degraded {
            direct_leg(a, b)
        } else {
            match self.service.leg(a, b).await {
                Ok(leg) => leg,
                Err(err) => {
                    warn!(error = %err, "route leg unavailable; using straight-line estimates");
                    self.degraded = true;
                    direct_leg(a, b)
                }
            }
        };

        self.legs.insert((from, to), leg);
        leg
    }
}

impl RoutePlanner {
    pub fn new(service: Arc<dyn RouteService>, metrics: Metrics) -> Self {
        Self { service, metrics }
    }

    pub async fn plan(&self, start: RouteStop, middle: Vec<RouteStop>, end: Option<RouteStop>) -> PlannedRoute {
        let has_end = end.is_some();
        let mut stops = Vec::with_capacity(middle.len() + 2);
        stops.push(start);
        stops.extend(middle);
        stops.extend(end);
        let points: Vec<GeoPoint> = stops.iter().map(|stop| stop.location).collect();

        if effectively_identical(&points) {
            debug!(stops = stops.len(), "all stops coincide; returning stationary route");
            let legs = points.windows(2).map(|pair| direct_leg(pair[0], pair[1])).collect();
            return PlannedRoute::from_legs(stops, legs, true);
        }

        let middle_count = stops.len() - 1 - usize::from(has_end);
        let middle_indices: Vec<usize> = (1..=middle_count).collect();
        let mut cache = LegCache::new(self.service.as_ref(), &points);

        let ordered_middle = if middle_count <= 1 {
            middle_indices
        } else if points.len() <= EXHAUSTIVE_SEARCH_MAX_POINTS {
            best_permutation(&mut cache, &middle_indices, has_end.then_some(points.len() - 1)).await
        } else {
            let start_point = points[0];
            let middle_points: Vec<GeoPoint> = middle_indices.iter().map(|i| points[*i]).collect();
            let end_point = has_end.then(|| points[points.len() - 1]);

            match self.service.optimize(start_point, middle_points, end_point).await {
                Ok(order) if is_permutation(&order, middle_count) => order.into_iter().map(|i| i + 1).collect(),
                Ok(order) => {
                    warn!(?order, "optimizer returned an invalid order; using nearest neighbour");
                    self.metrics
                        .routing_fallbacks_total
                        .with_label_values(&["invalid_order"])
                        .inc();
                    nearest_neighbour(&points, &middle_indices)
                }
                Err(err) => {
                    warn!(error = %err, "route optimizer unavailable; using nearest neighbour");
                    self.metrics
                        .routing_fallbacks_total
                        .with_label_values(&["optimizer"])
                        .inc();
                    nearest_neighbour(&points, &middle_indices)
                }
            }
        };

        let mut sequence = Vec::with_capacity(points.len());
        sequence.push(0);
        sequence.extend(ordered_middle);
        if has_end {
            sequence.push(points.len() - 1);
        }

        let mut legs = Vec::with_capacity(sequence.len().saturating_sub(1));
        for pair in sequence.windows(2) {
            legs.push(cache.get(pair[0], pair[1]).await);
        }

        if cache.degraded {
            self.metrics
                .routing_fallbacks_total
                .with_label_values(&["leg"])
                .inc();
        }

        let mut slots: Vec<Option<RouteStop>> = stops.into_iter().map(Some).collect();
        let ordered_stops = sequence.iter().filter_map(|i| slots[*i].take()).collect();

        PlannedRoute::from_legs(ordered_stops, legs, cache.degraded)
    }
}

async fn best_permutation(cache: &mut LegCache<'_>, middle: &[usize], end: Option<usize>) -> Vec<usize> {
    let mut best: Option<(f64, Vec<usize>)> = None;

    for candidate in permutations(middle) {
        let mut total = 0.0;
        let mut previous = 0;
        for stop in candidate.iter().copied().chain(end) {
            total += cache.get(previous, stop).await.distance_km;
            previous = stop;
        }

        if best.as_ref().is_none_or(|(best_total, _)| total < *best_total) {
            best = Some((total, candidate));
        }
    }

    best.map(|(_, order)| order).unwrap_or_else(|| middle.to_vec())
}

fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }

    let mut result = Vec::new();
    for (i, head) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, *head);
            result.push(tail);
        }
    }
    result
}

fn nearest_neighbour(points: &[GeoPoint], middle: &[usize]) -> Vec<usize> {
    let mut remaining = middle.to_vec();
    let mut ordered = Vec::with_capacity(middle.len());
    let mut current = points[0];

    while !remaining.is_empty() {
        let (position, _) = remaining
            .iter()
            .enumerate()
            .map(|(pos, idx)| (pos, haversine_km(&current, &points[*idx])))
            .fold((0, f64::INFINITY), |best, candidate| {
                if candidate.1 < best.1 { candidate } else { best }
            });
        let next = remaining.remove(position);
        current = points[next];
        ordered.push(next);
    }

    ordered
}

fn is_permutation(order: &[usize], len: usize) -> bool {
    let mut seen = vec![false; len];
    order.len() == len
        && order.iter().all(|i| {
            if *i >= len || seen[*i] {
                return false;
            }
            seen[*i] = true;
            true
        })
}
