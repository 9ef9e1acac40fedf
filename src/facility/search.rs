//! Deterministic ranked facility retrieval.
//!
//! Pipeline per query: load active candidates matching the type/category
//! filters, compute great-circle distance when a user location is given,
//! drop candidates past the radius, sort (distance ascending, else name),
//! truncate to the limit. `total_count` is counted before truncation.
//!
//! The engine is stateless per call; concurrent searches are independent.

use serde::Serialize;

use super::geo::{haversine_m, GeoBounds};
use super::store::FacilityStore;
use super::{Coordinates, Facility, FacilityType};
use crate::error::SearchError;
use crate::WasteCategory;

pub const RADIUS_MIN_M: u32 = 100;
pub const RADIUS_MAX_M: u32 = 50_000;
pub const DEFAULT_RADIUS_M: u32 = 5_000;
pub const LIMIT_MIN: usize = 1;
pub const LIMIT_MAX: usize = 100;
pub const DEFAULT_LIMIT: usize = 50;

/// Raw query as received from the caller. Unset fields fall back to engine
/// defaults; out-of-range values are clamped, not rejected.
#[derive(Clone, Debug, Default)]
pub struct SearchQuery {
    pub category: Option<WasteCategory>,
    pub facility_type: Option<FacilityType>,
    pub user_location: Option<Coordinates>,
    pub radius_m: Option<u32>,
    pub limit: Option<usize>,
}

/// Echoed, normalized parameters a search actually executed with.
#[derive(Clone, Debug, Serialize)]
pub struct SearchParams {
    pub category: Option<WasteCategory>,
    pub facility_type: Option<FacilityType>,
    pub user_location: Option<Coordinates>,
    /// Clamped radius; only applied when `user_location` is present.
    pub radius_m: u32,
    /// Clamped limit.
    pub limit: usize,
}

/// One facility in a search result, with its computed distance when the
/// query carried a user location.
#[derive(Clone, Debug, Serialize)]
pub struct RankedFacility {
    #[serde(flatten)]
    pub facility: Facility,
    /// Meters from the user location, rounded to the nearest integer.
    pub distance_m: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchResponse {
    pub facilities: Vec<RankedFacility>,
    /// Count matching filters + radius, before the limit truncation.
    pub total_count: usize,
    pub params: SearchParams,
}

/// Facility search engine. Holds only configuration; every call is
/// independent.
#[derive(Clone, Debug)]
pub struct SearchEngine {
    bounds: GeoBounds,
    default_radius_m: u32,
    default_limit: usize,
}

impl SearchEngine {
    pub fn new(bounds: GeoBounds) -> Self {
        Self {
            bounds,
            default_radius_m: DEFAULT_RADIUS_M,
            default_limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_defaults(mut self, radius_m: u32, limit: usize) -> Self {
        self.default_radius_m = radius_m;
        self.default_limit = limit;
        self
    }

    pub fn search(
        &self,
        store: &dyn FacilityStore,
        query: SearchQuery,
    ) -> Result<SearchResponse, SearchError> {
        let params = self.normalize(&query)?;

        let candidates = store.load_candidates(params.facility_type, params.category)?;

        let mut ranked: Vec<RankedFacility> = candidates
            .into_iter()
            .map(|facility| {
                let distance_m = params.user_location.map(|loc| {
                    haversine_m(
                        loc.lat,
                        loc.lng,
                        facility.coordinates.lat,
                        facility.coordinates.lng,
                    )
                    .round() as u64
                });
                RankedFacility {
                    facility,
                    distance_m,
                }
            })
            .collect();

        if params.user_location.is_some() {
            let radius = params.radius_m as u64;
            ranked.retain(|r| r.distance_m.is_some_and(|d| d <= radius));
            ranked.sort_by(|a, b| {
                a.distance_m
                    .cmp(&b.distance_m)
                    .then_with(|| a.facility.name.cmp(&b.facility.name))
            });
        } else {
            ranked.sort_by(|a, b| {
                a.facility
                    .name
                    .cmp(&b.facility.name)
                    .then_with(|| a.facility.id.cmp(&b.facility.id))
            });
        }

        let total_count = ranked.len();
        ranked.truncate(params.limit);

        Ok(SearchResponse {
            facilities: ranked,
            total_count,
            params,
        })
    }

    fn normalize(&self, query: &SearchQuery) -> Result<SearchParams, SearchError> {
        if let Some(loc) = query.user_location {
            if !loc.lat.is_finite() || !loc.lng.is_finite() {
                return Err(SearchError::Validation(
                    "lat/lng must be finite numbers".to_string(),
                ));
            }
            if !self.bounds.contains(loc.lat, loc.lng) {
                return Err(SearchError::LocationOutOfBounds {
                    lat: loc.lat,
                    lng: loc.lng,
                });
            }
        }
        Ok(SearchParams {
            category: query.category,
            facility_type: query.facility_type,
            user_location: query.user_location,
            radius_m: query
                .radius_m
                .unwrap_or(self.default_radius_m)
                .clamp(RADIUS_MIN_M, RADIUS_MAX_M),
            limit: query
                .limit
                .unwrap_or(self.default_limit)
                .clamp(LIMIT_MIN, LIMIT_MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::InMemoryFacilityStore;
    use std::collections::HashSet;

    fn facility(id: &str, name: &str, lat: f64, lng: f64, active: bool) -> Facility {
        Facility {
            id: id.to_string(),
            name: name.to_string(),
            facility_type: FacilityType::Tps,
            coordinates: Coordinates { lat, lng },
            accepted_categories: HashSet::from([WasteCategory::Organik]),
            operating_hours: Some("06:00-18:00".to_string()),
            is_active: active,
        }
    }

    /// Central Jakarta user point used across these tests.
    const USER: Coordinates = Coordinates {
        lat: -6.2088,
        lng: 106.8456,
    };

    fn store_with_two_nearby() -> InMemoryFacilityStore {
        InMemoryFacilityStore::new(vec![
            // ~2784 m from USER
            facility("f-far", "TPS Menteng", -6.1860, 106.8560, true),
            // ~1222 m from USER
            facility("f-near", "TPS Setiabudi", -6.1989, 106.8504, true),
        ])
    }

    #[test]
    fn ranked_by_distance_within_radius() {
        let engine = SearchEngine::new(GeoBounds::jakarta());
        let response = engine
            .search(
                &store_with_two_nearby(),
                SearchQuery {
                    category: Some(WasteCategory::Organik),
                    user_location: Some(USER),
                    radius_m: Some(3_000),
                    ..SearchQuery::default()
                },
            )
            .unwrap();

        assert_eq!(response.total_count, 2);
        assert_eq!(response.facilities[0].facility.id, "f-near");
        assert_eq!(response.facilities[1].facility.id, "f-far");
        // Distances non-decreasing and all within the radius.
        let distances: Vec<u64> = response
            .facilities
            .iter()
            .map(|r| r.distance_m.unwrap())
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        assert!(distances.iter().all(|d| *d <= 3_000));
    }

    #[test]
    fn radius_drops_far_facilities() {
        let engine = SearchEngine::new(GeoBounds::jakarta());
        let response = engine
            .search(
                &store_with_two_nearby(),
                SearchQuery {
                    user_location: Some(USER),
                    radius_m: Some(2_000),
                    ..SearchQuery::default()
                },
            )
            .unwrap();
        assert_eq!(response.total_count, 1);
        assert_eq!(response.facilities[0].facility.id, "f-near");
    }

    #[test]
    fn tiny_radius_yields_empty_not_error() {
        let engine = SearchEngine::new(GeoBounds::jakarta());
        let response = engine
            .search(
                &store_with_two_nearby(),
                SearchQuery {
                    user_location: Some(USER),
                    radius_m: Some(100),
                    ..SearchQuery::default()
                },
            )
            .unwrap();
        assert_eq!(response.total_count, 0);
        assert!(response.facilities.is_empty());
    }

    #[test]
    fn no_location_sorts_by_name_and_ignores_radius() {
        let engine = SearchEngine::new(GeoBounds::jakarta());
        let store = InMemoryFacilityStore::new(vec![
            facility("b", "Bank Sampah Hijau", -6.19, 106.83, true),
            facility("a", "TPS Cikini", -6.20, 106.84, true),
            facility("c", "TPS Ancol", -6.12, 106.83, true),
            facility("d", "TPS Tertutup", -6.20, 106.85, false),
        ]);
        let response = engine
            .search(
                &store,
                SearchQuery {
                    radius_m: Some(100), // no location, so no radius filtering
                    ..SearchQuery::default()
                },
            )
            .unwrap();

        let names: Vec<&str> = response
            .facilities
            .iter()
            .map(|r| r.facility.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["Bank Sampah Hijau", "TPS Ancol", "TPS Cikini"]
        );
        assert_eq!(response.total_count, 3); // inactive excluded
        assert!(response.facilities.iter().all(|r| r.distance_m.is_none()));
    }

    #[test]
    fn limit_truncates_but_total_count_does_not() {
        let engine = SearchEngine::new(GeoBounds::jakarta());
        let store = InMemoryFacilityStore::new(
            (0..10)
                .map(|i| facility(&format!("f{}", i), &format!("TPS {:02}", i), -6.20, 106.84, true))
                .collect(),
        );
        let response = engine
            .search(
                &store,
                SearchQuery {
                    limit: Some(3),
                    ..SearchQuery::default()
                },
            )
            .unwrap();
        assert_eq!(response.facilities.len(), 3);
        assert_eq!(response.total_count, 10);
    }

    #[test]
    fn radius_and_limit_are_clamped() {
        let engine = SearchEngine::new(GeoBounds::jakarta());
        let response = engine
            .search(
                &store_with_two_nearby(),
                SearchQuery {
                    radius_m: Some(1),
                    limit: Some(10_000),
                    ..SearchQuery::default()
                },
            )
            .unwrap();
        assert_eq!(response.params.radius_m, RADIUS_MIN_M);
        assert_eq!(response.params.limit, LIMIT_MAX);
    }

    #[test]
    fn out_of_bounds_location_is_rejected() {
        let engine = SearchEngine::new(GeoBounds::jakarta());
        let err = engine
            .search(
                &store_with_two_nearby(),
                SearchQuery {
                    user_location: Some(Coordinates {
                        lat: 48.8566,
                        lng: 2.3522,
                    }),
                    ..SearchQuery::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, SearchError::LocationOutOfBounds { .. }));
    }

    #[test]
    fn category_filter_uses_accepted_set() {
        let engine = SearchEngine::new(GeoBounds::jakarta());
        let mut organic_only = facility("o", "TPS Organik", -6.20, 106.84, true);
        organic_only.accepted_categories = HashSet::from([WasteCategory::Organik]);
        let mut mixed = facility("m", "Bank Sampah Campur", -6.20, 106.84, true);
        mixed.accepted_categories =
            HashSet::from([WasteCategory::Organik, WasteCategory::Anorganik]);
        let store = InMemoryFacilityStore::new(vec![organic_only, mixed]);

        let response = engine
            .search(
                &store,
                SearchQuery {
                    category: Some(WasteCategory::Anorganik),
                    ..SearchQuery::default()
                },
            )
            .unwrap();
        assert_eq!(response.total_count, 1);
        assert_eq!(response.facilities[0].facility.id, "m");
    }
}
