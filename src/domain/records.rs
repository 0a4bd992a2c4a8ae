use serde::{Deserialize, Serialize};
use validator::Validate;

use super::Coordinates;

/// A location that must receive a fixed volume of supply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DemandPoint {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    pub demand: u32,
}

impl DemandPoint {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, demand: u32) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            demand,
        }
    }

    pub fn location(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// A site that may be commissioned to supply demand points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CandidateFacility {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    pub capacity: u32,
    #[validate(range(min = 0.0))]
    pub fixed_cost: f64,
}

impl CandidateFacility {
    pub fn new(
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        capacity: u32,
        fixed_cost: f64,
    ) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            capacity,
            fixed_cost,
        }
    }

    pub fn location(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Units routed from one facility to one demand point, referenced by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub facility_name: String,
    pub demand_name: String,
    pub volume: f64,
}

impl Flow {
    pub fn new(facility_name: impl Into<String>, demand_name: impl Into<String>, volume: f64) -> Self {
        Self {
            facility_name: facility_name.into(),
            demand_name: demand_name.into(),
            volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demand_point_validation() {
        assert!(DemandPoint::new("Toowong", -27.48, 152.99, 10).validate().is_ok());
        assert!(DemandPoint::new("", -27.48, 152.99, 10).validate().is_err());
        assert!(DemandPoint::new("North", 91.0, 0.0, 10).validate().is_err());
        assert!(DemandPoint::new("East", 0.0, 180.5, 10).validate().is_err());
    }

    #[test]
    fn test_facility_rejects_negative_fixed_cost() {
        let facility = CandidateFacility::new("Depot", -27.5, 153.0, 100, -1.0);
        let errors = facility.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("fixed_cost"));
    }

    #[test]
    fn test_location_uses_record_coordinates() {
        let facility = CandidateFacility::new("Depot", -27.5, 153.0, 100, 0.0);
        let loc = facility.location();
        assert_eq!(loc.latitude, -27.5);
        assert_eq!(loc.longitude, 153.0);
    }
}
