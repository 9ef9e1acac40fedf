use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::facility::GeoBounds;

const DEFAULT_DB_PATH: &str = "jakolah.db";
const DEFAULT_CLASSIFY_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8701";
const DEFAULT_FRAME_INTERVAL_MS: u64 = 2_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_RADIUS_M: u32 = 5_000;
const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    db_path: Option<String>,
    api: Option<ApiConfigFile>,
    classify: Option<ClassifyConfigFile>,
    search: Option<SearchConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifyConfigFile {
    base_url: Option<String>,
    frame_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    max_image_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchConfigFile {
    default_radius_m: Option<u32>,
    default_limit: Option<usize>,
    bounds: Option<GeoBounds>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub api_addr: String,
    pub classify: ClassifySettings,
    pub search: SearchSettings,
}

#[derive(Debug, Clone)]
pub struct ClassifySettings {
    pub base_url: String,
    pub frame_interval: Duration,
    pub request_timeout: Duration,
    pub max_image_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub default_radius_m: u32,
    pub default_limit: usize,
    pub bounds: GeoBounds,
}

impl AppConfig {
    /// Load configuration: optional JSON file pointed to by
    /// `JAKOLAH_CONFIG`, then `JAKOLAH_*` env overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("JAKOLAH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let classify = file.classify.unwrap_or_default();
        let search = file.search.unwrap_or_default();
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            classify: ClassifySettings {
                base_url: classify
                    .base_url
                    .unwrap_or_else(|| DEFAULT_CLASSIFY_URL.to_string()),
                frame_interval: Duration::from_millis(
                    classify.frame_interval_ms.unwrap_or(DEFAULT_FRAME_INTERVAL_MS),
                ),
                request_timeout: Duration::from_millis(
                    classify
                        .request_timeout_ms
                        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
                ),
                max_image_bytes: classify.max_image_bytes.unwrap_or(DEFAULT_MAX_IMAGE_BYTES),
            },
            search: SearchSettings {
                default_radius_m: search.default_radius_m.unwrap_or(DEFAULT_RADIUS_M),
                default_limit: search.default_limit.unwrap_or(DEFAULT_LIMIT),
                bounds: search.bounds.unwrap_or_default(),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("JAKOLAH_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(addr) = std::env::var("JAKOLAH_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(url) = std::env::var("JAKOLAH_CLASSIFY_URL") {
            if !url.trim().is_empty() {
                self.classify.base_url = url;
            }
        }
        if let Ok(interval) = std::env::var("JAKOLAH_FRAME_INTERVAL_MS") {
            let ms: u64 = interval
                .parse()
                .map_err(|_| anyhow!("JAKOLAH_FRAME_INTERVAL_MS must be an integer of milliseconds"))?;
            self.classify.frame_interval = Duration::from_millis(ms);
        }
        if let Ok(timeout) = std::env::var("JAKOLAH_REQUEST_TIMEOUT_MS") {
            let ms: u64 = timeout
                .parse()
                .map_err(|_| anyhow!("JAKOLAH_REQUEST_TIMEOUT_MS must be an integer of milliseconds"))?;
            self.classify.request_timeout = Duration::from_millis(ms);
        }
        if let Ok(radius) = std::env::var("JAKOLAH_DEFAULT_RADIUS_M") {
            let meters: u32 = radius
                .parse()
                .map_err(|_| anyhow!("JAKOLAH_DEFAULT_RADIUS_M must be an integer of meters"))?;
            self.search.default_radius_m = meters;
        }
        if let Ok(limit) = std::env::var("JAKOLAH_DEFAULT_LIMIT") {
            let limit: usize = limit
                .parse()
                .map_err(|_| anyhow!("JAKOLAH_DEFAULT_LIMIT must be an integer"))?;
            self.search.default_limit = limit;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.classify.frame_interval.is_zero() {
            return Err(anyhow!("frame interval must be greater than zero"));
        }
        if self.classify.request_timeout.is_zero() {
            return Err(anyhow!("request timeout must be greater than zero"));
        }
        if self.classify.max_image_bytes == 0 {
            return Err(anyhow!("max image bytes must be greater than zero"));
        }
        if !(100..=50_000).contains(&self.search.default_radius_m) {
            return Err(anyhow!(
                "default radius {} out of range 100..=50000",
                self.search.default_radius_m
            ));
        }
        if !(1..=100).contains(&self.search.default_limit) {
            return Err(anyhow!(
                "default limit {} out of range 1..=100",
                self.search.default_limit
            ));
        }
        if !self.search.bounds.is_valid() {
            return Err(anyhow!("search bounds rectangle is invalid"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
