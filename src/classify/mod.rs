//! Classification proxy.
//!
//! Submits one encoded frame to the remote inference service and normalizes
//! its response/error surface into [`ClassificationResult`] /
//! [`ClassifyError`].
//!
//! The proxy is responsible for:
//! - Failing fast on bad input (type, size, minimum dimensions) before any
//!   network call
//! - Enforcing the per-request timeout
//! - Mapping remote status codes onto the typed error taxonomy
//!
//! The proxy MUST NOT:
//! - Retain frame bytes beyond the request lifetime
//! - Leak internal transport detail through `ClassifyError::Failed`
//! - Retry on its own (the next scheduled tick is the retry)

mod result;

pub use result::{BoundingBox, ClassificationResult, Detection};

use anyhow::Result as AnyResult;
use rand::Rng;
use std::time::Duration;

use crate::error::ClassifyError;
use crate::source::{EncodedFrame, ImageFormat};

/// Acceptance floor for the best detection confidence, 0..=1 scale.
/// Below this the frame is reported as unclassifiable, not as a result.
pub const UNCLASSIFIABLE_CONFIDENCE: f32 = 0.3;

/// User-facing "low confidence" warning threshold, 0..=100 scale.
/// A separate policy from the acceptance floor: accepted detections under
/// this are flagged in the session history but still count as successes.
pub const LOW_CONFIDENCE_WARN_PERCENT: f32 = 70.0;

/// Upload cap on the frame path, matching the remote service's own limit.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// The remote model rejects frames smaller than this on either side.
pub const MIN_FRAME_DIMENSION: u32 = 224;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);
const DEFAULT_RETRY_AFTER_RATE_LIMIT_SECS: u64 = 60;
const DEFAULT_RETRY_AFTER_UNAVAILABLE_SECS: u64 = 30;

/// Classifier seam.
///
/// The scheduler drives any implementation of this trait; tests inject
/// slow or failing fakes through it.
pub trait Classifier: Send + Sync {
    fn classify(
        &self,
        frame: &EncodedFrame,
        session_id: &str,
    ) -> Result<ClassificationResult, ClassifyError>;
}

/// HTTP client for the remote inference endpoint.
pub struct HttpClassifier {
    base_url: String,
    timeout: Duration,
    max_image_bytes: usize,
    agent: ureq::Agent,
}

impl HttpClassifier {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            agent: ureq::Agent::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_image_bytes(mut self, max: usize) -> Self {
        self.max_image_bytes = max;
        self
    }

    fn validate(&self, frame: &EncodedFrame) -> Result<(), ClassifyError> {
        let format = ImageFormat::sniff(&frame.bytes).ok_or_else(|| {
            ClassifyError::Validation(
                "unsupported image type; expected JPEG, PNG or WebP".to_string(),
            )
        })?;
        if format != frame.format {
            return Err(ClassifyError::Validation(format!(
                "frame bytes look like {} but were declared {}",
                format.mime_type(),
                frame.format.mime_type()
            )));
        }
        if frame.bytes.len() > self.max_image_bytes {
            return Err(ClassifyError::Validation(format!(
                "frame too large: {} bytes (limit {})",
                frame.bytes.len(),
                self.max_image_bytes
            )));
        }
        if let Some((width, height)) = frame.dimensions {
            if width < MIN_FRAME_DIMENSION || height < MIN_FRAME_DIMENSION {
                return Err(ClassifyError::Validation(format!(
                    "frame {}x{} below minimum {}x{}",
                    width, height, MIN_FRAME_DIMENSION, MIN_FRAME_DIMENSION
                )));
            }
        }
        Ok(())
    }
}

impl Classifier for HttpClassifier {
    fn classify(
        &self,
        frame: &EncodedFrame,
        session_id: &str,
    ) -> Result<ClassificationResult, ClassifyError> {
        self.validate(frame)?;

        let boundary = multipart_boundary();
        let body = multipart_body(&boundary, &frame.bytes, frame.format);
        let url = format!("{}/api/classify-frame", self.base_url);

        let response = self
            .agent
            .post(&url)
            .timeout(self.timeout)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body);
        // `body` drops here; no frame bytes survive the request.
        drop(body);

        match response {
            Ok(response) => handle_success(response, session_id),
            Err(ureq::Error::Status(code, response)) => Err(map_status(code, response)),
            Err(ureq::Error::Transport(transport)) => {
                log::warn!("classification transport error: {}", transport);
                Err(ClassifyError::Failed(
                    "could not reach the classification service".to_string(),
                ))
            }
        }
    }
}

fn handle_success(
    response: ureq::Response,
    session_id: &str,
) -> Result<ClassificationResult, ClassifyError> {
    let body = read_body(response).map_err(|e| {
        log::warn!("classification response read failed: {}", e);
        ClassifyError::Failed("classification response was truncated".to_string())
    })?;
    let timestamp_ms = crate::now_ms().unwrap_or_default();
    let result = result::parse_response(&body, session_id, timestamp_ms).map_err(|e| {
        log::warn!("classification response rejected: {}", e);
        ClassifyError::Failed("classification response was malformed".to_string())
    })?;

    if result.detections.is_empty() {
        return Err(ClassifyError::Unclassifiable {
            max_confidence: 0.0,
            suggestion: Some("Arahkan kamera ke objek sampah".to_string()),
        });
    }
    let max_confidence = result.max_confidence();
    if max_confidence < UNCLASSIFIABLE_CONFIDENCE {
        return Err(ClassifyError::Unclassifiable {
            max_confidence,
            suggestion: Some("Dekatkan kamera dan perbaiki pencahayaan".to_string()),
        });
    }
    Ok(result)
}

/// Map a non-2xx status onto the error taxonomy.
fn map_status(code: u16, response: ureq::Response) -> ClassifyError {
    let retry_after = retry_after_secs(&response);
    let body = read_body(response).unwrap_or_default();
    match code {
        422 => {
            let (max_confidence, suggestion) = parse_unclassifiable_body(&body);
            ClassifyError::Unclassifiable {
                max_confidence,
                suggestion,
            }
        }
        429 => ClassifyError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_RATE_LIMIT_SECS),
        },
        code if code >= 500 => ClassifyError::ServiceUnavailable {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_UNAVAILABLE_SECS),
        },
        400 => ClassifyError::Validation("frame rejected by the classification service".to_string()),
        _ => {
            log::warn!("classification returned unexpected status {}", code);
            ClassifyError::Failed("classification request failed".to_string())
        }
    }
}

fn retry_after_secs(response: &ureq::Response) -> Option<u64> {
    response
        .header("Retry-After")
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// Best-effort extraction of `max_confidence` / `suggestion` from a 422 body.
/// The remote wraps them under `detail` or at the top level depending on
/// version, so this walks both.
fn parse_unclassifiable_body(body: &[u8]) -> (f32, Option<String>) {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return (0.0, None);
    };
    let node = value.get("detail").unwrap_or(&value);
    let max_confidence = node
        .get("max_confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0) as f32;
    let suggestion = node
        .get("suggestion")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    (max_confidence, suggestion)
}

fn read_body(response: ureq::Response) -> AnyResult<Vec<u8>> {
    use std::io::Read;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(1024 * 1024)
        .read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn multipart_boundary() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..16)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            char::from_digit(idx, 36).unwrap_or('0')
        })
        .collect();
    format!("jakolah-frame-{}", suffix)
}

fn multipart_body(boundary: &str, bytes: &[u8], format: ImageFormat) -> Vec<u8> {
    let filename = match format {
        ImageFormat::Jpeg => "frame.jpg",
        ImageFormat::Png => "frame.png",
        ImageFormat::Webp => "frame.webp",
    };
    let head = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: {mime}\r\n\r\n",
        boundary = boundary,
        filename = filename,
        mime = format.mime_type()
    );
    let tail = format!("\r\n--{}--\r\n", boundary);

    let mut body = Vec::with_capacity(head.len() + bytes.len() + tail.len());
    body.extend_from_slice(head.as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(tail.as_bytes());
    body
}
