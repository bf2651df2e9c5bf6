use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub const DEFAULT_TILE_URL: &str = "https://api.tomtom.com/traffic/map/4/tile/flow";
pub const DEFAULT_GEOCODE_URL: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend {other:?}, expected mongo or memory")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub store_backend: StoreBackend,
    pub mongodb_uri: String,
    pub mongodb_db: String,
    pub tomtom_api_key: Option<String>,
    pub tomtom_tile_url: String,
    pub geocode_url: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            bind_addr: try_load("BIND_ADDR", "127.0.0.1"),
            port: try_load("PORT", "5000"),
            store_backend: try_load("STORE_BACKEND", "mongo"),
            mongodb_uri: try_load("MONGODB_URI", "mongodb://localhost:27017"),
            mongodb_db: try_load("MONGODB_DB", "livemap"),
            tomtom_api_key: optional("TOMTOM_API_KEY"),
            tomtom_tile_url: try_load("TOMTOM_TILE_URL", DEFAULT_TILE_URL),
            geocode_url: try_load("GEOCODE_URL", DEFAULT_GEOCODE_URL),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => {
            warn!("{key} not set");
            None
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
