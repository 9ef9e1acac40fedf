//! Facility model and geospatial search.
//!
//! A facility is a physical waste-handling location. The search engine
//! filters and ranks read-only copies from a [`FacilityStore`]; nothing in
//! this module mutates stored facilities.

mod geo;
mod search;
mod store;

pub use geo::{haversine_m, GeoBounds};
pub use search::{RankedFacility, SearchEngine, SearchParams, SearchQuery, SearchResponse};
pub use store::{FacilityStore, InMemoryFacilityStore, SqliteFacilityStore};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::WasteCategory;

/// Kinds of waste-handling locations.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FacilityType {
    /// Tempat Penampungan Sementara - neighborhood collection point.
    Tps,
    /// Tempat Pemrosesan Akhir - final disposal site.
    Tpa,
    /// Deposit/exchange point for recyclables.
    BankSampah,
    RecyclingCenter,
}

impl FacilityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityType::Tps => "tps",
            FacilityType::Tpa => "tpa",
            FacilityType::BankSampah => "bank_sampah",
            FacilityType::RecyclingCenter => "recycling_center",
        }
    }

    pub fn parse(value: &str) -> Option<FacilityType> {
        match value.trim().to_lowercase().as_str() {
            "tps" => Some(FacilityType::Tps),
            "tpa" => Some(FacilityType::Tpa),
            "bank_sampah" | "banksampah" => Some(FacilityType::BankSampah),
            "recycling_center" | "recyclingcenter" => Some(FacilityType::RecyclingCenter),
            _ => None,
        }
    }
}

impl std::fmt::Display for FacilityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic point.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// A physical waste-handling location. Read-only from the search engine's
/// perspective.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub facility_type: FacilityType,
    pub coordinates: Coordinates,
    pub accepted_categories: HashSet<WasteCategory>,
    pub operating_hours: Option<String>,
    pub is_active: bool,
}

impl Facility {
    pub fn accepts(&self, category: WasteCategory) -> bool {
        self.accepted_categories.contains(&category)
    }
}
