use std::future::Future;

use futures::stream::BoxStream;
use rand::Rng;

use crate::{types::{PostDocument, PostPatch}, LivemapError};

/// every full result set of a standing query, newest first
pub type SnapshotStream = BoxStream<'static, Result<Vec<PostDocument>, LivemapError>>;

pub trait PostStore: Clone + Send + Sync + 'static {
    fn insert(&self, post: &PostDocument) -> impl Future<Output = Result<(), LivemapError>> + Send;

    fn get(&self, id: &str) -> impl Future<Output = Result<Option<PostDocument>, LivemapError>> + Send;

    /// fails with `PostNotFound` if nothing has this id
    fn update(&self, id: &str, patch: &PostPatch, updated_at: i64) -> impl Future<Output = Result<(), LivemapError>> + Send;

    /// deleting a missing id is not an error
    fn delete(&self, id: &str) -> impl Future<Output = Result<(), LivemapError>> + Send;

    /// posts with `createdAt >= since`, newest first
    fn find_since(&self, since: i64) -> impl Future<Output = Result<Vec<PostDocument>, LivemapError>> + Send;

    /// yields `find_since(since)` once right away and again after every change to the collection.
    /// `since` is fixed for the lifetime of the stream
    fn watch_since(&self, since: i64) -> impl Future<Output = Result<SnapshotStream, LivemapError>> + Send;
}

const ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-";

pub fn gen_id() -> String {
    let mut rng = rand::thread_rng();
    (0..10)
        .map(|_| ID_CHARS[rng.gen_range(0..ID_CHARS.len())] as char)
        .collect()
}

pub(crate) fn newest_first(posts: &mut [PostDocument]) {
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
