//! facility_search - run one ranked facility query against the store.
//!
//! Operator tool: prints the search response as JSON, the same shape the
//! HTTP API serves.

use anyhow::{anyhow, Result};
use clap::Parser;

use jakolah_core::facility::Coordinates;
use jakolah_core::{
    AppConfig, FacilityType, SearchEngine, SearchQuery, SqliteFacilityStore, WasteCategory,
};

#[derive(Parser, Debug)]
#[command(name = "facility_search", about = "Query the facility store")]
struct Args {
    /// SQLite database path; defaults to the configured db_path.
    #[arg(long)]
    db: Option<String>,

    #[arg(long)]
    lat: Option<f64>,

    #[arg(long)]
    lng: Option<f64>,

    /// Search radius in meters (only applies with --lat/--lng).
    #[arg(long)]
    radius: Option<u32>,

    /// Waste category filter (Organik, Anorganik, Lainnya).
    #[arg(long)]
    category: Option<String>,

    /// Facility type filter (tps, tpa, bank_sampah, recycling_center).
    #[arg(long = "type")]
    facility_type: Option<String>,

    #[arg(long)]
    limit: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let cfg = AppConfig::load()?;

    let user_location = match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
        (None, None) => None,
        _ => return Err(anyhow!("--lat and --lng must be provided together")),
    };
    let category = match &args.category {
        Some(value) => Some(
            WasteCategory::parse_strict(value)
                .ok_or_else(|| anyhow!("unknown category '{}'", value))?,
        ),
        None => None,
    };
    let facility_type = match &args.facility_type {
        Some(value) => Some(
            FacilityType::parse(value)
                .ok_or_else(|| anyhow!("unknown facility type '{}'", value))?,
        ),
        None => None,
    };

    let db_path = args.db.unwrap_or(cfg.db_path);
    let store = SqliteFacilityStore::open(&db_path)?;
    let engine = SearchEngine::new(cfg.search.bounds)
        .with_defaults(cfg.search.default_radius_m, cfg.search.default_limit);

    let response = engine.search(
        &store,
        SearchQuery {
            category,
            facility_type,
            user_location,
            radius_m: args.radius,
            limit: args.limit,
        },
    )?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
