use std::sync::Arc;

use tracing::debug;

use crate::{
    store::{gen_id, PostStore},
    types::{validate_lat, validate_lng, NewPost, Post, PostDocument, PostPatch, DEFAULT_USERNAME, POST_LIFETIME_MS},
    Clock, LivemapError,
};

/// the one handle the rest of the server uses to read and change posts
#[derive(Clone)]
pub struct PostsGateway<S> {
    pub(crate) store: S,
    pub(crate) clock: Arc<dyn Clock>,
}

impl<S: PostStore> PostsGateway<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn create(&self, input: NewPost) -> Result<Post, LivemapError> {
        validate_lat(input.lat)?;
        validate_lng(input.lng)?;

        if let Some(ttl) = input.ttl_minutes {
            debug!("ignoring requested ttl of {ttl} minutes");
        }

        let now = self.clock.now_ms();
        let expires_at = now + POST_LIFETIME_MS;
        let post = PostDocument {
            id: gen_id(),
            kind: input.kind,
            text: Some(input.text.unwrap_or_default()),
            lat: input.lat,
            lng: input.lng,
            created_at: now,
            expires_at: Some(expires_at),
            image_url: Some(input.image_url.unwrap_or_default()),
            username: Some(input.username.unwrap_or_else(|| DEFAULT_USERNAME.to_string())),
            updated_at: None,
        };

        self.store.insert(&post).await?;
        Ok(Post::expiring_at(post, expires_at))
    }

    /// the stored document, whether or not it could ever show up in a feed
    pub async fn get(&self, id: &str) -> Result<Option<PostDocument>, LivemapError> {
        self.store.get(id).await
    }

    pub async fn update(&self, id: &str, patch: PostPatch) -> Result<(), LivemapError> {
        if let Some(lat) = patch.lat { validate_lat(lat)?; }
        if let Some(lng) = patch.lng { validate_lng(lng)?; }

        self.store.update(id, &patch, self.clock.now_ms()).await
    }

    pub async fn update_location(&self, id: &str, lat: f64, lng: f64) -> Result<(), LivemapError> {
        self.update(id, PostPatch::location(lat, lng)).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), LivemapError> {
        self.store.delete(id).await
    }
}
