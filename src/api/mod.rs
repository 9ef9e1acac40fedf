//! Facility search HTTP API.
//!
//! Minimal HTTP/1.1 endpoint over a blocking `TcpListener`, served from one
//! worker thread. Authentication and session issuance are external
//! collaborators; this surface is read-only facility retrieval plus a
//! health probe.
//!
//! Routes:
//! - `GET /health`
//! - `GET /facilities/search?lat&lng&radius&category&type&limit`

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::SearchError;
use crate::facility::{Coordinates, FacilityStore, FacilityType, SearchEngine, SearchQuery};
use crate::WasteCategory;

const MAX_REQUEST_BYTES: usize = 8192;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8701".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    engine: SearchEngine,
    store: Box<dyn FacilityStore>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, engine: SearchEngine, store: Box<dyn FacilityStore>) -> Self {
        Self { cfg, engine, store }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let engine = self.engine;
        let store = self.store;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, engine, store, shutdown_thread) {
                log::error!("facility api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    engine: SearchEngine,
    store: Box<dyn FacilityStore>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &engine, store.as_ref()) {
                    log::warn!("facility api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    engine: &SearchEngine,
    store: &dyn FacilityStore,
) -> Result<()> {
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }

    match request.path.as_str() {
        "/health" => {
            write_json_response(&mut stream, 200, r#"{"status":"ok","service":"facility-search"}"#)
        }
        "/facilities/search" => {
            let query = match parse_search_query(&request.query) {
                Ok(query) => query,
                Err(err) => {
                    let (status, body) = error_payload(&err);
                    write_json_response(&mut stream, status, &body)?;
                    return Ok(());
                }
            };
            match engine.search(store, query) {
                Ok(response) => {
                    let payload = serde_json::to_vec(&response)?;
                    write_response(&mut stream, 200, "application/json", &payload)
                }
                Err(err) => {
                    let (status, body) = error_payload(&err);
                    write_json_response(&mut stream, status, &body)
                }
            }
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn error_payload(err: &SearchError) -> (u16, String) {
    let status = match err {
        SearchError::Validation(_) => 400,
        SearchError::LocationOutOfBounds { .. } => 422,
        SearchError::Store(_) => 500,
    };
    // Store failures stay internal; the code alone goes out.
    let message = match err {
        SearchError::Store(inner) => {
            log::error!("facility store failure: {}", inner);
            "internal error".to_string()
        }
        other => other.to_string(),
    };
    let body = serde_json::json!({ "error": err.code(), "message": message }).to_string();
    (status, body)
}

/// Decode and validate query parameters into a [`SearchQuery`].
///
/// `lat` and `lng` must be given jointly; `radius` and `limit` are parsed
/// here and clamped by the engine.
fn parse_search_query(raw_query: &str) -> Result<SearchQuery, SearchError> {
    let pairs: HashMap<String, String> = url::form_urlencoded::parse(raw_query.as_bytes())
        .into_owned()
        .collect();

    let category = match pairs.get("category") {
        Some(value) => Some(WasteCategory::parse_strict(value).ok_or_else(|| {
            SearchError::Validation(format!("unknown category '{}'", value))
        })?),
        None => None,
    };
    let facility_type = match pairs.get("type") {
        Some(value) => Some(FacilityType::parse(value).ok_or_else(|| {
            SearchError::Validation(format!("unknown facility type '{}'", value))
        })?),
        None => None,
    };

    let lat = parse_f64(&pairs, "lat")?;
    let lng = parse_f64(&pairs, "lng")?;
    let user_location = match (lat, lng) {
        (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
        (None, None) => None,
        _ => {
            return Err(SearchError::Validation(
                "lat and lng must be provided together".to_string(),
            ))
        }
    };

    let radius_m = match pairs.get("radius") {
        Some(value) => Some(value.parse::<u32>().map_err(|_| {
            SearchError::Validation(format!("radius '{}' is not a whole number of meters", value))
        })?),
        None => None,
    };
    let limit = match pairs.get("limit") {
        Some(value) => Some(value.parse::<usize>().map_err(|_| {
            SearchError::Validation(format!("limit '{}' is not a whole number", value))
        })?),
        None => None,
    };

    Ok(SearchQuery {
        category,
        facility_type,
        user_location,
        radius_m,
        limit,
    })
}

fn parse_f64(pairs: &HashMap<String, String>, key: &str) -> Result<Option<f64>, SearchError> {
    match pairs.get(key) {
        Some(value) => value
            .parse::<f64>()
            .map(Some)
            .map_err(|_| SearchError::Validation(format!("{} '{}' is not a number", key, value))),
        None => Ok(None),
    }
}

struct HttpRequest {
    method: String,
    path: String,
    query: String,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, query),
        None => (raw_path, ""),
    };
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query: query.to_string(),
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        422 => "HTTP/1.1 422 Unprocessable Entity",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}
