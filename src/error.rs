//! Error taxonomy for the classification pipeline and facility search.
//!
//! Callers are expected to match on these variants: transient errors carry a
//! retry-after hint, unclassifiable results carry a user-facing suggestion.
//! Internal transport detail never leaks past `ClassifyError::Failed`.

/// Errors produced by the classification proxy.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// Bad input, recoverable by the caller correcting it. Raised before any
    /// network call is made.
    #[error("invalid frame: {0}")]
    Validation(String),

    /// A legitimate negative result, not a system failure: no waste object
    /// found or best confidence below the acceptance floor.
    #[error("unclassifiable (max confidence {max_confidence:.2})")]
    Unclassifiable {
        /// Best-effort maximum confidence seen, 0..=1.
        max_confidence: f32,
        /// User-facing suggestion from the remote service, if any.
        suggestion: Option<String>,
    },

    /// Remote rate limit (429). Callers must not retry before the hint.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Remote unavailable (5xx). Callers back off using the hint; no
    /// automatic retry beyond the normal tick cadence.
    #[error("classification service unavailable, retry after {retry_after_secs}s")]
    ServiceUnavailable { retry_after_secs: u64 },

    /// Catch-all. The message is safe to surface to end users.
    #[error("classification failed: {0}")]
    Failed(String),
}

impl ClassifyError {
    /// Stable short code for logs and session history markers.
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifyError::Validation(_) => "validation",
            ClassifyError::Unclassifiable { .. } => "unclassifiable",
            ClassifyError::RateLimited { .. } => "rate_limited",
            ClassifyError::ServiceUnavailable { .. } => "service_unavailable",
            ClassifyError::Failed(_) => "failed",
        }
    }

    /// Backoff hint, present only for transient variants.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ClassifyError::RateLimited { retry_after_secs }
            | ClassifyError::ServiceUnavailable { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Errors produced by the facility search engine.
///
/// "No results" is never an error; these cover malformed or out-of-domain
/// input and store failures only.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid search query: {0}")]
    Validation(String),

    /// The user location falls outside the configured geographic sanity box.
    #[error("location ({lat}, {lng}) is outside the service area")]
    LocationOutOfBounds { lat: f64, lng: f64 },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl SearchError {
    /// Stable short code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::Validation(_) => "invalid_query",
            SearchError::LocationOutOfBounds { .. } => "location_out_of_bounds",
            SearchError::Store(_) => "store_error",
        }
    }
}
