use std::collections::HashMap;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::capacity::Capacity;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CourierRole {
    Volunteer,
    Driver,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CourierStatus {
    Available,
    Busy,
}

/// A daily availability slot. Bounds are `HH:MM` and compared as strings,
/// inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self, AppError> {
        let start_time = parse_hhmm(start)?;
        let end_time = parse_hhmm(end)?;

        if start_time > end_time {
            return Err(AppError::Validation(format!(
                "time window start {start} is after end {end}"
            )));
        }

        Ok(Self {
            start: start_time.format("%H:%M").to_string(),
            end: end_time.format("%H:%M").to_string(),
        })
    }

    pub fn contains(&self, hhmm: &str) -> bool {
        self.start.as_str() <= hhmm && hhmm <= self.end.as_str()
    }
}

fn parse_hhmm(raw: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| AppError::Validation(format!("invalid time {raw:?}, expected HH:MM")))
}

pub type WeeklyAvailability = HashMap<Weekday, Vec<TimeWindow>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub name: String,
    pub role: CourierRole,
    pub location: Option<GeoPoint>,
    pub capacity: Capacity,
    pub availability: WeeklyAvailability,
    pub status: CourierStatus,
    pub active_assignments: u32,
    pub completed_deliveries: u32,
    pub updated_at: DateTime<Utc>,
}

impl Courier {
    pub fn is_available_at(&self, weekday: Weekday, hhmm: &str) -> bool {
        self.availability
            .get(&weekday)
            .is_some_and(|slots| slots.iter().any(|slot| slot.contains(hhmm)))
    }

    pub fn valid_location(&self) -> Option<GeoPoint> {
        self.location.filter(GeoPoint::is_valid)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Utc, Weekday};
    use uuid::Uuid;

    use super::{Courier, CourierRole, CourierStatus, GeoPoint, TimeWindow};
    use crate::models::capacity::Capacity;

    fn courier_with(day: Weekday, window: TimeWindow) -> Courier {
        Courier {
            id: Uuid::new_v4(),
            name: "window-tester".to_string(),
            role: CourierRole::Volunteer,
            location: Some(GeoPoint::new(36.8, 10.18)),
            capacity: Capacity::Small,
            availability: HashMap::from([(day, vec![window])]),
            status: CourierStatus::Available,
            active_assignments: 0,
            completed_deliveries: 0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let window = TimeWindow::parse("09:00", "17:30").unwrap();
        assert!(window.contains("09:00"));
        assert!(window.contains("17:30"));
        assert!(!window.contains("08:59"));
        assert!(!window.contains("17:31"));
    }

    #[test]
    fn parse_normalizes_and_rejects_garbage() {
        let window = TimeWindow::parse("9:05", "18:00").unwrap();
        assert_eq!(window.start, "09:05");
        assert!(TimeWindow::parse("nine", "18:00").is_err());
        assert!(TimeWindow::parse("18:00", "09:00").is_err());
    }

    #[test]
    fn availability_is_scoped_to_weekday() {
        let courier = courier_with(Weekday::Mon, TimeWindow::parse("08:00", "12:00").unwrap());
        assert!(courier.is_available_at(Weekday::Mon, "10:15"));
        assert!(!courier.is_available_at(Weekday::Tue, "10:15"));
    }

    #[test]
    fn non_finite_location_is_ignored() {
        let mut courier = courier_with(Weekday::Mon, TimeWindow::parse("08:00", "12:00").unwrap());
        courier.location = Some(GeoPoint::new(f64::NAN, 10.0));
        assert!(courier.valid_location().is_none());
    }
}
