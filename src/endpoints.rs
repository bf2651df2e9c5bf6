use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, patch},
    Json,
};
use serde::Deserialize;

use crate::{
    clone_into_closure,
    feed::FEED_WINDOWS_MINUTES,
    gateway::PostsGateway,
    geocode::GeocodeClient,
    store::PostStore,
    types::{NewPost, Post, PostPatch},
    LivemapError,
};

#[derive(Deserialize, Debug)]
struct FeedQuery {
    minutes: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Deserialize, Debug)]
struct LocationData {
    lat: f64,
    lng: f64,
}

pub fn check_window(minutes: u32) -> Result<u32, LivemapError> {
    if FEED_WINDOWS_MINUTES.contains(&minutes) { Ok(minutes) }
    else { Err(LivemapError::InvalidInput(format!("window must be one of {FEED_WINDOWS_MINUTES:?} minutes"))) }
}

pub fn get_endpoints_router<S: PostStore>(gateway: &PostsGateway<S>, geocoder: &GeocodeClient) -> axum::Router {
    axum::Router::new()
        .route("/posts",
            get(clone_into_closure! {
                (gateway)
                |Query(FeedQuery { minutes }): Query<FeedQuery>| async move {
                    let minutes = check_window(minutes.unwrap_or(FEED_WINDOWS_MINUTES[0]))?;
                    gateway.live_posts(minutes).await.map(Json)
                }
            })
            .post(clone_into_closure! {
                (gateway)
                |Json(input): Json<NewPost>| async move {
                    gateway.create(input).await.map(|post| (StatusCode::CREATED, Json(post)))
                }
            })
        )
        .route("/posts/{post_id}",
            get(clone_into_closure! {
                (gateway)
                |Path(post_id): Path<String>| async move {
                    // a document without an expiry is never live, so there's nothing to show
                    match gateway.get(&post_id).await?.and_then(Post::from_document) {
                        Some(post) => Ok(Json(post)),
                        None => Err(LivemapError::PostNotFound(post_id)),
                    }
                }
            })
            .patch(clone_into_closure! {
                (gateway)
                |Path(post_id): Path<String>, Json(patch): Json<PostPatch>| async move {
                    gateway.update(&post_id, patch).await.map(|()| StatusCode::NO_CONTENT)
                }
            })
            .delete(clone_into_closure! {
                (gateway)
                |Path(post_id): Path<String>| async move {
                    gateway.delete(&post_id).await.map(|()| StatusCode::NO_CONTENT)
                }
            })
        )
        .route("/posts/{post_id}/location",
            patch(clone_into_closure! {
                (gateway)
                |Path(post_id): Path<String>, Json(LocationData { lat, lng }): Json<LocationData>| async move {
                    gateway.update_location(&post_id, lat, lng).await.map(|()| StatusCode::NO_CONTENT)
                }
            })
        )
        .route("/search",
            get(clone_into_closure! {
                (geocoder)
                |Query(SearchQuery { q }): Query<SearchQuery>| async move {
                    geocoder.suggest(&q).await.map(Json)
                }
            })
        )
}
