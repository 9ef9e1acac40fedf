//! JakOlah core
//!
//! This crate implements the two engineering cores of the JakOlah waste
//! application:
//!
//! 1. A real-time classification pipeline: a frame scheduler samples a live
//!    source on a fixed cadence, submits frames to a remote inference
//!    service through a normalizing proxy, and folds every outcome into a
//!    per-session accumulator.
//! 2. A geospatial facility search engine: ranked, radius-filtered retrieval
//!    of waste-disposal facilities around a user location.
//!
//! # Module Structure
//!
//! - `classify`: HTTP classification client (proxy to the remote model)
//! - `scheduler`: tick loop with skip-if-busy backpressure and deterministic
//!   teardown
//! - `session`: pure reducer accumulating classification outcomes
//! - `source`: frame sources (stub, image directory)
//! - `overlay`: pure detection-to-viewport coordinate transform
//! - `facility`: facility model, Haversine distance, search engine, stores
//! - `api`: facility search HTTP endpoint
//!
//! Invariants the pipeline upholds:
//!
//! - At most one classification request in flight per session; busy ticks
//!   are skipped, never queued.
//! - Results apply to the session in arrival order, which equals submission
//!   order.
//! - No frame bytes are retained beyond the request lifetime.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod api;
pub mod classify;
pub mod config;
pub mod error;
pub mod facility;
pub mod overlay;
pub mod scheduler;
pub mod session;
pub mod source;

pub use classify::{
    BoundingBox, ClassificationResult, Classifier, Detection, HttpClassifier,
    LOW_CONFIDENCE_WARN_PERCENT, UNCLASSIFIABLE_CONFIDENCE,
};
pub use config::AppConfig;
pub use error::{ClassifyError, SearchError};
pub use facility::{
    haversine_m, Facility, FacilityStore, FacilityType, GeoBounds, InMemoryFacilityStore,
    SearchEngine, SearchQuery, SearchResponse, SqliteFacilityStore,
};
pub use overlay::{render_overlay, FrameSize, LabelAnchor, Overlay, OverlayRect, Viewport};
pub use scheduler::{FrameScheduler, SchedulerConfig, SchedulerHandle, SchedulerStats};
pub use session::{HistoryEntry, Session, SessionSummary, TickOutcome};
pub use source::{DirectorySource, EncodedFrame, FrameSource, ImageFormat, StubSource};

/// Waste categories used across the pipeline and facility model.
///
/// Wire strings use the original Indonesian labels.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WasteCategory {
    Organik,
    Anorganik,
    Lainnya,
}

impl WasteCategory {
    pub const ALL: [WasteCategory; 3] = [
        WasteCategory::Organik,
        WasteCategory::Anorganik,
        WasteCategory::Lainnya,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WasteCategory::Organik => "Organik",
            WasteCategory::Anorganik => "Anorganik",
            WasteCategory::Lainnya => "Lainnya",
        }
    }

    /// Parse a wire label, case-insensitively. Unknown labels map to
    /// `Lainnya` so an upgraded remote model cannot break the pipeline.
    pub fn parse_lossy(label: &str) -> WasteCategory {
        match label.trim().to_lowercase().as_str() {
            "organik" | "organic" => WasteCategory::Organik,
            "anorganik" | "inorganic" => WasteCategory::Anorganik,
            _ => WasteCategory::Lainnya,
        }
    }

    /// Strict parse for query parameters: unknown labels are an error.
    pub fn parse_strict(label: &str) -> Option<WasteCategory> {
        match label.trim().to_lowercase().as_str() {
            "organik" | "organic" => Some(WasteCategory::Organik),
            "anorganik" | "inorganic" => Some(WasteCategory::Anorganik),
            "lainnya" | "other" => Some(WasteCategory::Lainnya),
            _ => None,
        }
    }
}

impl std::fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current time as milliseconds since the Unix epoch.
pub fn now_ms() -> Result<u64> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(now.as_millis() as u64)
}
