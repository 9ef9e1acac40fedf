use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::TcpStream;

use anyhow::Result;
use serde_json::Value;

use jakolah_core::api::{ApiConfig, ApiHandle, ApiServer};
use jakolah_core::facility::Coordinates;
use jakolah_core::{
    Facility, FacilityType, GeoBounds, InMemoryFacilityStore, SearchEngine, WasteCategory,
};

fn facility(id: &str, name: &str, lat: f64, lng: f64) -> Facility {
    Facility {
        id: id.to_string(),
        name: name.to_string(),
        facility_type: FacilityType::Tps,
        coordinates: Coordinates { lat, lng },
        accepted_categories: HashSet::from([WasteCategory::Organik]),
        operating_hours: None,
        is_active: true,
    }
}

fn read_response(stream: &mut TcpStream) -> Result<(String, String)> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

struct TestApi {
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new(facilities: Vec<Facility>) -> Result<Self> {
        let store = InMemoryFacilityStore::new(facilities);
        let engine = SearchEngine::new(GeoBounds::jakarta());
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        };
        let api_handle = ApiServer::new(api_config, engine, Box::new(store)).spawn()?;
        Ok(Self {
            api_handle: Some(api_handle),
        })
    }

    fn get(&self, path_and_query: &str) -> Result<(String, String)> {
        let addr = self
            .api_handle
            .as_ref()
            .expect("test API handle should be initialized")
            .addr;
        let mut stream = TcpStream::connect(addr)?;
        let request = format!("GET {path_and_query} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        stream.write_all(request.as_bytes())?;
        read_response(&mut stream)
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

#[test]
fn health_endpoint_reports_ok() -> Result<()> {
    let api = TestApi::new(Vec::new())?;
    let (headers, body) = api.get("/health")?;
    assert!(headers.contains("200 OK"));

    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["status"], "ok");
    Ok(())
}

#[test]
fn search_returns_ranked_facilities_as_json() -> Result<()> {
    let api = TestApi::new(vec![
        facility("f-far", "TPS Menteng", -6.1860, 106.8560),
        facility("f-near", "TPS Setiabudi", -6.1989, 106.8504),
    ])?;
    let (headers, body) = api.get("/facilities/search?lat=-6.2088&lng=106.8456&radius=3000")?;
    assert!(headers.contains("200 OK"));

    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["total_count"], 2);
    let facilities = value["facilities"].as_array().expect("facilities array");
    assert_eq!(facilities[0]["id"], "f-near");
    assert_eq!(facilities[1]["id"], "f-far");
    assert!(facilities[0]["distance_m"].as_u64() <= facilities[1]["distance_m"].as_u64());
    assert_eq!(value["params"]["radius_m"], 3000);
    Ok(())
}

#[test]
fn out_of_bounds_location_returns_422() -> Result<()> {
    let api = TestApi::new(vec![facility("f", "TPS Cikini", -6.1950, 106.8410)])?;
    let (headers, body) = api.get("/facilities/search?lat=48.8566&lng=2.3522")?;
    assert!(headers.contains("422 Unprocessable Entity"));

    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["error"], "location_out_of_bounds");
    Ok(())
}

#[test]
fn malformed_query_returns_400() -> Result<()> {
    let api = TestApi::new(Vec::new())?;
    let (headers, body) = api.get("/facilities/search?lat=-6.2")?;
    assert!(headers.contains("400 Bad Request"));

    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["error"], "invalid_query");
    Ok(())
}

#[test]
fn unknown_route_returns_404() -> Result<()> {
    let api = TestApi::new(Vec::new())?;
    let (headers, _body) = api.get("/nope")?;
    assert!(headers.contains("404 Not Found"));
    Ok(())
}
