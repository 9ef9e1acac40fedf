//! Session accumulation.
//!
//! A [`Session`] is the accumulated state of repeated classification
//! attempts for one continuous user interaction. It is mutated exclusively
//! through the reducer [`Session::apply`], a pure function from old state
//! plus one tick outcome to new state, so the aggregation logic tests
//! without a scheduler or UI harness.
//!
//! Invariants:
//! - `success_count + failure_count == total_attempts` at every point
//! - `history.len() <= 50`, newest entry first
//! - A session is owned by exactly one scheduler instance; no concurrent
//!   writers

use serde::Serialize;
use std::collections::HashMap;
use std::collections::VecDeque;

use crate::classify::{ClassificationResult, LOW_CONFIDENCE_WARN_PERCENT};
use crate::WasteCategory;

/// Rolling history capacity.
pub const HISTORY_CAPACITY: usize = 50;

/// How many history entries the summary exposes.
pub const RECENT_WINDOW: usize = 10;

/// One entry in the rolling history. Failures are kept too, so the window
/// reflects attempt density rather than successes only.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Success {
        result: ClassificationResult,
        /// True when every detection sits under the warning threshold
        /// (0-100 scale); surfaced to the UI, never counted as a failure.
        low_confidence: bool,
    },
    Failure {
        /// Short error code, e.g. "unclassifiable" or "service_unavailable".
        reason: String,
        timestamp_ms: u64,
    },
}

/// The outcome of one completed tick, as seen by the reducer.
#[derive(Clone, Debug)]
pub enum TickOutcome {
    Classified(ClassificationResult),
    Failed { reason: String, timestamp_ms: u64 },
}

/// Accumulated per-session state.
#[derive(Clone, Debug, Serialize)]
pub struct Session {
    pub session_id: String,
    pub start_ms: u64,
    pub total_attempts: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub category_counts: HashMap<WasteCategory, u64>,
    history: VecDeque<HistoryEntry>,
}

impl Session {
    pub fn new(session_id: &str, start_ms: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            start_ms,
            total_attempts: 0,
            success_count: 0,
            failure_count: 0,
            category_counts: HashMap::new(),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Reducer: fold one tick outcome into the session.
    ///
    /// A classified result with at least one detection is a success and
    /// raises a counter per detected category (one frame can raise several).
    /// A result with zero detections, or any error, is a failure.
    pub fn apply(mut self, outcome: TickOutcome) -> Session {
        self.total_attempts += 1;
        match outcome {
            TickOutcome::Classified(result) if !result.detections.is_empty() => {
                self.success_count += 1;
                for detection in &result.detections {
                    *self.category_counts.entry(detection.category).or_insert(0) += 1;
                }
                let low_confidence = result
                    .detections
                    .iter()
                    .all(|d| d.confidence * 100.0 < LOW_CONFIDENCE_WARN_PERCENT);
                self.push_history(HistoryEntry::Success {
                    result,
                    low_confidence,
                });
            }
            TickOutcome::Classified(result) => {
                self.failure_count += 1;
                self.push_history(HistoryEntry::Failure {
                    reason: "no_detections".to_string(),
                    timestamp_ms: result.timestamp_ms,
                });
            }
            TickOutcome::Failed {
                reason,
                timestamp_ms,
            } => {
                self.failure_count += 1;
                self.push_history(HistoryEntry::Failure {
                    reason,
                    timestamp_ms,
                });
            }
        }
        self
    }

    fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push_front(entry);
        self.history.truncate(HISTORY_CAPACITY);
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Derived snapshot for the UI consumer. Recomputed on demand, never
    /// cached; `now_ms` is the only time dependency and is passed in
    /// explicitly, so identical `(session, now_ms)` pairs yield identical
    /// summaries.
    pub fn summary(&self, now_ms: u64) -> SessionSummary {
        let success_rate_percent = if self.total_attempts == 0 {
            0.0
        } else {
            let rate = self.success_count as f64 / self.total_attempts as f64 * 100.0;
            (rate * 10.0).round() / 10.0
        };
        SessionSummary {
            session_id: self.session_id.clone(),
            duration_seconds: now_ms.saturating_sub(self.start_ms) / 1000,
            total_attempts: self.total_attempts,
            success_rate_percent,
            category_counts: self.category_counts.clone(),
            recent: self.history.iter().take(RECENT_WINDOW).cloned().collect(),
        }
    }
}

/// Read-only snapshot handed to the UI layer.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub duration_seconds: u64,
    pub total_attempts: u64,
    /// Rounded to one decimal place.
    pub success_rate_percent: f64,
    pub category_counts: HashMap<WasteCategory, u64>,
    pub recent: Vec<HistoryEntry>,
}
