//! Facility stores.
//!
//! The search engine only ever reads facilities; the store owns schema and
//! seeding. Two implementations: SQLite for the daemon and an in-memory
//! store for tests and embedding.

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use std::collections::HashSet;

use super::{Coordinates, Facility, FacilityType};
use crate::WasteCategory;

/// Read-only candidate retrieval plus seeding. `load_candidates` returns
/// active facilities only, pre-filtered by type and accepted category.
pub trait FacilityStore: Send {
    fn load_candidates(
        &self,
        facility_type: Option<FacilityType>,
        category: Option<WasteCategory>,
    ) -> Result<Vec<Facility>>;

    fn insert(&mut self, facility: &Facility) -> Result<()>;

    fn count_active(&self) -> Result<usize>;
}

// -------------------- sqlite --------------------

pub struct SqliteFacilityStore {
    conn: Connection,
}

impl SqliteFacilityStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("open facility db {}", db_path))?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS facilities (
              id TEXT PRIMARY KEY,
              name TEXT NOT NULL,
              facility_type TEXT NOT NULL,
              lat REAL NOT NULL,
              lng REAL NOT NULL,
              accepted_categories TEXT NOT NULL,
              operating_hours TEXT,
              is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_facilities_type ON facilities(facility_type);
            CREATE INDEX IF NOT EXISTS idx_facilities_active ON facilities(is_active);
            "#,
        )?;
        Ok(())
    }
}

impl FacilityStore for SqliteFacilityStore {
    fn load_candidates(
        &self,
        facility_type: Option<FacilityType>,
        category: Option<WasteCategory>,
    ) -> Result<Vec<Facility>> {
        let mut sql = String::from(
            "SELECT id, name, facility_type, lat, lng, accepted_categories, operating_hours, is_active \
             FROM facilities WHERE is_active = 1",
        );
        if facility_type.is_some() {
            sql.push_str(" AND facility_type = ?1");
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = match facility_type {
            Some(ft) => stmt.query(params![ft.as_str()])?,
            None => stmt.query([])?,
        };

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let facility = row_to_facility(row)?;
            // Category membership lives in a JSON column, so the accepted
            // set is checked after decode rather than in SQL.
            if let Some(category) = category {
                if !facility.accepts(category) {
                    continue;
                }
            }
            out.push(facility);
        }
        Ok(out)
    }

    fn insert(&mut self, facility: &Facility) -> Result<()> {
        let categories = serde_json::to_string(
            &facility
                .accepted_categories
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>(),
        )?;
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO facilities
              (id, name, facility_type, lat, lng, accepted_categories, operating_hours, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                facility.id,
                facility.name,
                facility.facility_type.as_str(),
                facility.coordinates.lat,
                facility.coordinates.lng,
                categories,
                facility.operating_hours,
                facility.is_active as i64,
            ],
        )?;
        Ok(())
    }

    fn count_active(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM facilities WHERE is_active = 1", [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }
}

fn row_to_facility(row: &rusqlite::Row<'_>) -> Result<Facility> {
    let facility_type_raw: String = row.get(2)?;
    let facility_type = FacilityType::parse(&facility_type_raw)
        .ok_or_else(|| anyhow!("corrupt facility row: unknown type '{}'", facility_type_raw))?;

    let categories_json: String = row.get(5)?;
    let labels: Vec<String> = serde_json::from_str(&categories_json)
        .with_context(|| format!("corrupt accepted_categories: {}", categories_json))?;
    let accepted_categories: HashSet<WasteCategory> = labels
        .iter()
        .filter_map(|label| WasteCategory::parse_strict(label))
        .collect();

    let is_active: i64 = row.get(7)?;
    Ok(Facility {
        id: row.get(0)?,
        name: row.get(1)?,
        facility_type,
        coordinates: Coordinates {
            lat: row.get(3)?,
            lng: row.get(4)?,
        },
        accepted_categories,
        operating_hours: row.get(6)?,
        is_active: is_active != 0,
    })
}

// -------------------- in-memory --------------------

#[derive(Clone, Debug, Default)]
pub struct InMemoryFacilityStore {
    facilities: Vec<Facility>,
}

impl InMemoryFacilityStore {
    pub fn new(facilities: Vec<Facility>) -> Self {
        Self { facilities }
    }
}

impl FacilityStore for InMemoryFacilityStore {
    fn load_candidates(
        &self,
        facility_type: Option<FacilityType>,
        category: Option<WasteCategory>,
    ) -> Result<Vec<Facility>> {
        Ok(self
            .facilities
            .iter()
            .filter(|f| f.is_active)
            .filter(|f| facility_type.is_none_or(|ft| f.facility_type == ft))
            .filter(|f| category.is_none_or(|c| f.accepts(c)))
            .cloned()
            .collect())
    }

    fn insert(&mut self, facility: &Facility) -> Result<()> {
        self.facilities.retain(|f| f.id != facility.id);
        self.facilities.push(facility.clone());
        Ok(())
    }

    fn count_active(&self) -> Result<usize> {
        Ok(self.facilities.iter().filter(|f| f.is_active).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, ft: FacilityType, active: bool) -> Facility {
        Facility {
            id: id.to_string(),
            name: format!("Facility {}", id),
            facility_type: ft,
            coordinates: Coordinates {
                lat: -6.2,
                lng: 106.84,
            },
            accepted_categories: HashSet::from([WasteCategory::Organik]),
            operating_hours: None,
            is_active: active,
        }
    }

    #[test]
    fn in_memory_filters_type_and_active() {
        let mut store = InMemoryFacilityStore::default();
        store.insert(&sample("a", FacilityType::Tps, true)).unwrap();
        store.insert(&sample("b", FacilityType::Tpa, true)).unwrap();
        store.insert(&sample("c", FacilityType::Tps, false)).unwrap();

        let tps = store
            .load_candidates(Some(FacilityType::Tps), None)
            .unwrap();
        assert_eq!(tps.len(), 1);
        assert_eq!(tps[0].id, "a");
        assert_eq!(store.count_active().unwrap(), 2);
    }

    #[test]
    fn in_memory_insert_replaces_by_id() {
        let mut store = InMemoryFacilityStore::default();
        store.insert(&sample("a", FacilityType::Tps, true)).unwrap();
        let mut updated = sample("a", FacilityType::Tps, false);
        updated.name = "Renamed".to_string();
        store.insert(&updated).unwrap();
        assert_eq!(store.count_active().unwrap(), 0);
    }
}
