use serde::{Deserialize, Serialize};

use crate::LivemapError;

/// every post lives exactly this long, whatever ttl the client asked for
pub const POST_LIFETIME_MS: i64 = 10 * 60_000;

pub const DEFAULT_USERNAME: &str = "Anonymous";

pub const WORLD_BOUND_LAT: f64 = 90.0;
pub const WORLD_BOUND_LNG: f64 = 180.0;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Accident,
    Traffic,
    Construction,
    Weather,
    User,
    Other,
}

/// a post as it sits in the `posts` collection
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PostDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PostType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    /// documents written by other clients may lack this; they are never live
    #[serde(rename = "expiresAt", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(rename = "imageURL", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl PostDocument {
    pub fn apply(&mut self, patch: &PostPatch, updated_at: i64) {
        if let Some(text) = &patch.text { self.text = Some(text.clone()); }
        if let Some(kind) = patch.kind { self.kind = kind; }
        if let Some(lat) = patch.lat { self.lat = lat; }
        if let Some(lng) = patch.lng { self.lng = lng; }
        if let Some(image_url) = &patch.image_url { self.image_url = Some(image_url.clone()); }
        if let Some(username) = &patch.username { self.username = Some(username.clone()); }
        self.updated_at = Some(updated_at);
    }
}

/// a post as clients see it, in the live feed and in every REST or socket reply
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PostType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
    #[serde(rename = "imageURL", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub username: String,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Post {
    /// `None` when the document has no expiry to judge liveness by
    pub fn from_document(doc: PostDocument) -> Option<Self> {
        let expires_at = doc.expires_at?;
        Some(Self::expiring_at(doc, expires_at))
    }

    pub(crate) fn expiring_at(doc: PostDocument, expires_at: i64) -> Self {
        Self {
            expires_at,
            id: doc.id,
            kind: doc.kind,
            text: doc.text,
            lat: doc.lat,
            lng: doc.lng,
            created_at: doc.created_at,
            image_url: doc.image_url,
            username: doc.username.unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            updated_at: doc.updated_at,
        }
    }

    pub fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at >= now_ms
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct NewPost {
    #[serde(rename = "type")]
    pub kind: PostType,
    #[serde(default)]
    pub text: Option<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "imageURL", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// accepted for compatibility, has no effect on expiry
    #[serde(rename = "ttlMinutes", default)]
    pub ttl_minutes: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PostPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PostType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(rename = "imageURL", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl PostPatch {
    pub fn location(lat: f64, lng: f64) -> Self {
        Self { lat: Some(lat), lng: Some(lng), ..Default::default() }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Suggestion {
    pub title: String,
    /// the full display name, empty when the place had none
    pub subtitle: String,
    pub lat: f64,
    pub lng: f64,
}

pub fn validate_lat(lat: f64) -> Result<(), LivemapError> {
    if lat.is_finite() && (-WORLD_BOUND_LAT..=WORLD_BOUND_LAT).contains(&lat) { Ok(()) }
    else { Err(LivemapError::InvalidInput(format!("lat {lat} is outside [-90, 90]"))) }
}

pub fn validate_lng(lng: f64) -> Result<(), LivemapError> {
    if lng.is_finite() && (-WORLD_BOUND_LNG..=WORLD_BOUND_LNG).contains(&lng) { Ok(()) }
    else { Err(LivemapError::InvalidInput(format!("lng {lng} is outside [-180, 180]"))) }
}
