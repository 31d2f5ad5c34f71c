use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One car of a company's fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub model: String,
    #[serde(default)]
    pub registration_number: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rent_per_day: Option<f64>,
    #[serde(default)]
    pub available: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyLocation {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

/// Company profile as returned by `GET /companies/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub contact_email: String,
    #[serde(default)]
    pub contact_phone: String,
    /// As reported by the backend; may lag behind `cars`.
    #[serde(default)]
    pub total_cars: Option<u32>,
    #[serde(default)]
    pub location: CompanyLocation,
    #[serde(default)]
    pub cars: Vec<Car>,
}

/// Fleet counters derived from a company profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetSummary {
    pub total_cars: usize,
    pub available_cars: usize,
    /// Cars per model, sorted by model name.
    pub by_model: BTreeMap<String, usize>,
}

impl FleetSummary {
    pub fn from_company(company: &Company) -> Self {
        let mut by_model = BTreeMap::new();
        for car in &company.cars {
            *by_model.entry(car.model.clone()).or_insert(0) += 1;
        }
        Self {
            total_cars: company.cars.len(),
            available_cars: company.cars.iter().filter(|c| c.available).count(),
            by_model,
        }
    }

    pub fn rented_cars(&self) -> usize {
        self.total_cars - self.available_cars
    }
}

impl fmt::Display for FleetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cars, {} available", self.total_cars, self.available_cars)?;
        for (model, count) in &self.by_model {
            write!(f, ", {model}: {count}")?;
        }
        Ok(())
    }
}
