use std::sync::LazyLock;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::Regex;
use tracing::{debug, warn};

use crate::{plain_text_response, LivemapError};

pub const MISSING_KEY_MESSAGE: &str = "TOMTOM_API_KEY is not set. Add it to the server environment (or .env) and restart.";

static TILE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/api/tomtom/flow/(relative|absolute)/([0-9]+)/([0-9]+)/([0-9]+)\.png$")
        .expect("tile path pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    pub style: String,
    pub z: String,
    pub x: String,
    pub y: String,
}

impl TileRequest {
    pub fn parse(path: &str) -> Option<Self> {
        let caps = TILE_PATH.captures(path)?;
        Some(Self {
            style: caps[1].to_string(),
            z: caps[2].to_string(),
            x: caps[3].to_string(),
            y: caps[4].to_string(),
        })
    }

    pub fn upstream_url(&self, base: &str) -> String {
        format!("{}/{}/{}/{}/{}.png", base.trim_end_matches('/'), self.style, self.z, self.x, self.y)
    }
}

/// forwards traffic-flow tile requests upstream with the server's key attached
#[derive(Clone, Debug)]
pub struct TileProxy {
    http: reqwest::Client,
    upstream_base: String,
    api_key: Option<String>,
}

impl TileProxy {
    pub fn new(http: reqwest::Client, upstream_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self { http, upstream_base: upstream_base.into(), api_key }
    }

    pub async fn fetch(&self, tile: &TileRequest) -> Response {
        let Some(key) = &self.api_key else {
            warn!("tile requested but TOMTOM_API_KEY is not configured");
            return plain_text_response(StatusCode::INTERNAL_SERVER_ERROR, MISSING_KEY_MESSAGE);
        };

        match self.forward(tile, key).await {
            Ok(res) => res,
            Err(err) => {
                warn!("tile upstream failed: {err}");
                plain_text_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }

    async fn forward(&self, tile: &TileRequest, key: &str) -> Result<Response, LivemapError> {
        let upstream = self.http
            .get(tile.upstream_url(&self.upstream_base))
            .query(&[("key", key)])
            .send()
            .await?;

        let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = if upstream.status().is_success() { "image/png" } else { "application/json; charset=utf-8" };
        let body = upstream.bytes().await?;

        debug!("tile {}/{}/{}/{} -> {status}", tile.style, tile.z, tile.x, tile.y);

        Ok((status, [(header::CONTENT_TYPE, content_type)], Body::from(body)).into_response())
    }
}

/// answers tile paths itself, everything else goes down the chain untouched.
/// the query string is part of the match, so `...12.png?v=1` is not a tile request
pub async fn tile_proxy_layer(State(proxy): State<TileProxy>, req: Request, next: Next) -> Response {
    let target = req.uri().path_and_query().map_or(req.uri().path(), |pq| pq.as_str());

    match TileRequest::parse(target) {
        Some(tile) => proxy.fetch(&tile).await,
        None => next.run(req).await,
    }
}
