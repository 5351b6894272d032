use serde::Serialize;
use uuid::Uuid;

use crate::models::batch::Batch;

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub proximity_score: f64,
    pub capacity_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedVolunteer {
    pub courier_id: Uuid,
    pub name: String,
    pub distance_km: Option<f64>,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedDriver {
    pub courier_id: Uuid,
    pub distance_km: f64,
    pub active_assignments: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchGeneration {
    Created { batches: Vec<Batch> },
    NothingToBatch,
    NoGeotaggedItems,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VolunteerAssignment {
    Assigned {
        batch_id: Uuid,
        courier_id: Uuid,
        score: f64,
    },
    NoCandidate {
        batch_id: Uuid,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DriverAssignment {
    Assigned {
        order_id: Uuid,
        driver_id: Uuid,
        distance_km: f64,
        consolidated: bool,
    },
    NoCandidate {
        order_id: Uuid,
        reason: String,
    },
}

impl DriverAssignment {
    pub fn driver_id(&self) -> Option<Uuid> {
        match self {
            DriverAssignment::Assigned { driver_id, .. } => Some(*driver_id),
            DriverAssignment::NoCandidate { .. } => None,
        }
    }
}
