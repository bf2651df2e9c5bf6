use std::sync::{atomic::{AtomicI64, Ordering}, Arc};

use axum::{body::Body, http::{header, StatusCode}, response::{IntoResponse, Response}};
use thiserror::Error;

pub mod config;
pub mod db;
pub mod debounce;
pub mod endpoints;
pub mod feed;
pub mod gateway;
pub mod geocode;
pub mod memory;
pub mod server;
pub mod socket;
pub mod store;
pub mod tile_proxy;
pub mod types;

#[macro_export]
macro_rules! clone_into_closure {
    ( ($( $x:ident ),*) $y:expr ) => {
        {
            $(let $x = $x.clone();)*
            $y
        }
    };
}

#[derive(Error, Debug)]
pub enum LivemapError {
    #[error("post {0} not found")]
    PostNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] mongodb::error::Error),

    #[error("upstream request failed: {0}")]
    Upstream(reqwest::Error),

    #[error("malformed place in geocoding response: {0}")]
    MalformedPlace(String),
}

// reqwest puts the full url (query string included) into its error messages
impl From<reqwest::Error> for LivemapError {
    fn from(err: reqwest::Error) -> Self {
        LivemapError::Upstream(err.without_url())
    }
}

impl LivemapError {
    pub fn to_status_code(&self) -> u16 {
        match self {
            LivemapError::PostNotFound(_) => 404,
            LivemapError::InvalidInput(_) => 400,
            LivemapError::Storage(_) => 500,
            LivemapError::Upstream(_) => 502,
            LivemapError::MalformedPlace(_) => 502,
        }
    }
}

impl IntoResponse for LivemapError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.to_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        plain_text_response(status, self.to_string())
    }
}

pub fn plain_text_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from(message.into()),
    ).into_response()
}

/// source of "now" for expiry and window calculations, in millis since the epoch
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// a clock that only moves when told to
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self { now: Arc::new(AtomicI64::new(start_ms)) }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.now.fetch_add(minutes * 60_000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
