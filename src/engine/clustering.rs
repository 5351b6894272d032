use thiserror::Error;
use uuid::Uuid;

use crate::geo::{centroid, planar_distance_sq};
use crate::models::capacity::Capacity;
use crate::models::courier::GeoPoint;

const MAX_CLUSTERS: usize = 10;
const ITEMS_PER_CLUSTER: usize = 3;
const MAX_ITERATIONS: usize = 100;

#[derive(Debug, Error)]
pub enum ClusteringError {
    #[error("cannot split {points} points into {k} clusters")]
    InvalidClusterCount { k: usize, points: usize },

    #[error("cluster {0} has no centroid")]
    MissingCentroid(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterInput {
    pub item_id: Uuid,
    pub location: GeoPoint,
    pub size: Capacity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub items: Vec<Uuid>,
    pub required_capacity: Capacity,
    pub center_point: GeoPoint,
}

/// `clamp(ceil(n / 3), 1, 10)`.
pub fn cluster_count(points: usize) -> usize {
    points.div_ceil(ITEMS_PER_CLUSTER).clamp(1, MAX_CLUSTERS)
}

/// Groups geotagged items into pickup clusters. Inputs with non-finite
/// coordinates are dropped; a single valid input becomes its own cluster.
pub fn cluster_items(inputs: &[ClusterInput]) -> Result<Vec<Cluster>, ClusteringError> {
    let valid: Vec<ClusterInput> = inputs
        .iter()
        .copied()
        .filter(|input| input.location.is_valid())
        .collect();

    match valid.len() {
        0 => Ok(Vec::new()),
        1 => Ok(vec![Cluster {
            items: vec![valid[0].item_id],
            required_capacity: valid[0].size,
            center_point: valid[0].location,
        }]),
        n => cluster_with_k(&valid, cluster_count(n)),
    }
}

/// Lloyd's k-means over raw lat/lng with farthest-point seeding, so the
/// result is deterministic for a given input order. Empty clusters are
/// dropped from the output.
pub fn cluster_with_k(inputs: &[ClusterInput], k: usize) -> Result<Vec<Cluster>, ClusteringError> {
    if k == 0 || k > inputs.len() {
        return Err(ClusteringError::InvalidClusterCount {
            k,
            points: inputs.len(),
        });
    }

    let points: Vec<GeoPoint> = inputs.iter().map(|input| input.location).collect();
    let mut centroids = seed_centroids(&points, k);
    let mut assignment = vec![usize::MAX; points.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (index, point) in points.iter().enumerate() {
            let nearest = nearest_centroid(point, &centroids);
            if assignment[index] != nearest {
                assignment[index] = nearest;
                changed = true;
            }
        }

        if !changed {
            break;
        }

        for (cluster, center) in centroids.iter_mut().enumerate() {
            let members: Vec<GeoPoint> = points
                .iter()
                .zip(&assignment)
                .filter(|(_, owner)| **owner == cluster)
                .map(|(point, _)| *point)
                .collect();
            if let Some(updated) = centroid(&members) {
                *center = updated;
            }
        }
    }

    let mut clusters = Vec::with_capacity(k);
    for cluster in 0..k {
        let members: Vec<&ClusterInput> = inputs
            .iter()
            .zip(&assignment)
            .filter(|(_, owner)| **owner == cluster)
            .map(|(input, _)| input)
            .collect();

        if members.is_empty() {
            continue;
        }

        let locations: Vec<GeoPoint> = members.iter().map(|input| input.location).collect();
        let center_point = centroid(&locations).ok_or(ClusteringError::MissingCentroid(cluster))?;

        clusters.push(Cluster {
            items: members.iter().map(|input| input.item_id).collect(),
            required_capacity: Capacity::max_of(members.iter().map(|input| input.size)),
            center_point,
        });
    }

    Ok(clusters)
}

fn seed_centroids(points: &[GeoPoint], k: usize) -> Vec<GeoPoint> {
    let mut centroids = vec![points[0]];

    while centroids.len() < k {
        let mut farthest = points[0];
        let mut farthest_distance = f64::NEG_INFINITY;
        for point in points {
            let distance = centroids
                .iter()
                .map(|center| planar_distance_sq(point, center))
                .fold(f64::INFINITY, f64::min);
            if distance > farthest_distance {
                farthest = *point;
                farthest_distance = distance;
            }
        }
        centroids.push(farthest);
    }

    centroids
}

fn nearest_centroid(point: &GeoPoint, centroids: &[GeoPoint]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, center) in centroids.iter().enumerate() {
        let distance = planar_distance_sq(point, center);
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}
