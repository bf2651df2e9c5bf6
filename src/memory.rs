use std::{collections::HashMap, sync::{Arc, RwLock}};

use futures::{stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{store::{newest_first, PostStore, SnapshotStream}, types::{PostDocument, PostPatch}, LivemapError};

/// posts held in process. every write pings the change channel so standing queries re-run
#[derive(Clone)]
pub struct MemoryPostStore {
    posts: Arc<RwLock<HashMap<String, PostDocument>>>,
    changes: broadcast::Sender<()>,
}

impl Default for MemoryPostStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPostStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self { posts: Arc::default(), changes }
    }

    /// how many standing queries are currently listening for changes
    pub fn watchers(&self) -> usize {
        self.changes.receiver_count()
    }

    fn snapshot_since(&self, since: i64) -> Vec<PostDocument> {
        let mut posts: Vec<PostDocument> = self.read()
            .values()
            .filter(|post| post.created_at >= since)
            .cloned()
            .collect();
        newest_first(&mut posts);
        posts
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, PostDocument>> {
        self.posts.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, PostDocument>> {
        self.posts.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self) {
        // no receivers just means nobody is watching
        let _ = self.changes.send(());
    }
}

impl PostStore for MemoryPostStore {
    async fn insert(&self, post: &PostDocument) -> Result<(), LivemapError> {
        self.write().insert(post.id.clone(), post.clone());
        self.notify();
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<PostDocument>, LivemapError> {
        Ok(self.read().get(id).cloned())
    }

    async fn update(&self, id: &str, patch: &PostPatch, updated_at: i64) -> Result<(), LivemapError> {
        {
            let mut posts = self.write();
            let Some(post) = posts.get_mut(id) else {
                return Err(LivemapError::PostNotFound(id.to_string()));
            };
            post.apply(patch, updated_at);
        }
        self.notify();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), LivemapError> {
        if self.write().remove(id).is_some() {
            self.notify();
        }
        Ok(())
    }

    async fn find_since(&self, since: i64) -> Result<Vec<PostDocument>, LivemapError> {
        Ok(self.snapshot_since(since))
    }

    async fn watch_since(&self, since: i64) -> Result<SnapshotStream, LivemapError> {
        // subscribe before the first snapshot so no write slips between the two
        let rx = self.changes.subscribe();

        let snapshots = stream::unfold((self.clone(), rx, true), move |(store, mut rx, first)| async move {
            if !first {
                match rx.recv().await {
                    // lagging only means several writes collapse into one snapshot
                    Ok(()) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return None,
                }
            }

            let snapshot = store.snapshot_since(since);
            Some((Ok(snapshot), (store, rx, false)))
        });

        Ok(snapshots.boxed())
    }
}
