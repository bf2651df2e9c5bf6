use axum::http::header::ACCEPT;
use serde::Deserialize;

use crate::{types::Suggestion, LivemapError};

pub const SUGGESTION_LIMIT: usize = 8;

/// one entry of the place-search response. coordinates arrive as strings
#[derive(Deserialize, Debug)]
struct RawPlace {
    display_name: Option<String>,
    lat: String,
    lon: String,
}

impl TryFrom<RawPlace> for Suggestion {
    type Error = LivemapError;

    fn try_from(raw: RawPlace) -> Result<Self, Self::Error> {
        let lat = raw.lat.trim().parse::<f64>()
            .map_err(|_| LivemapError::MalformedPlace(format!("lat {:?}", raw.lat)))?;
        let lng = raw.lon.trim().parse::<f64>()
            .map_err(|_| LivemapError::MalformedPlace(format!("lon {:?}", raw.lon)))?;

        let title = match &raw.display_name {
            Some(name) => name.split(',').next().unwrap_or(name).to_string(),
            None => "Unknown".to_string(),
        };

        Ok(Suggestion { title, subtitle: raw.display_name.unwrap_or_default(), lat, lng })
    }
}

/// text to coordinates against a nominatim-style search endpoint.
/// no retries, no caching; debouncing is the caller's job
#[derive(Clone, Debug)]
pub struct GeocodeClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GeocodeClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { http, endpoint: endpoint.into() }
    }

    pub async fn suggest(&self, query: &str) -> Result<Vec<Suggestion>, LivemapError> {
        let q = query.trim();
        if q.is_empty() {
            return Ok(Vec::new());
        }

        let limit = SUGGESTION_LIMIT.to_string();
        let places: Option<Vec<RawPlace>> = self.http
            .get(&self.endpoint)
            .query(&[("format", "json"), ("q", q), ("limit", limit.as_str())])
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .json()
            .await?;

        places
            .unwrap_or_default()
            .into_iter()
            .map(Suggestion::try_from)
            .collect()
    }
}
