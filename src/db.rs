use futures::{stream, StreamExt, TryStreamExt};
use mongodb::{bson::{doc, from_document, to_document, Document}, Client, Collection, IndexModel};
use tracing::{error, info, warn};

use crate::{store::{PostStore, SnapshotStream}, types::{PostDocument, PostPatch}, LivemapError};

/// posts kept in a mongodb collection. live updates ride on a change stream,
/// so the server has to be a replica set
#[derive(Clone)]
pub struct MongoPostStore {
    posts: Collection<PostDocument>,
}

impl MongoPostStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, LivemapError> {
        let client = Client::with_uri_str(uri).await?;
        let db = Self { posts: client.database(database).collection("posts") };

        db.posts
            .create_index(IndexModel::builder().keys(doc! { "createdAt": -1 }).build())
            .await
            .inspect_err(|mongo_err| error!("mongodb error when creating createdAt index: {mongo_err}"))?;

        info!("connected to mongodb database {database}");
        Ok(db)
    }
}

/// keeps the order, drops whatever doesn't read as a post
fn decode_posts(raw: Vec<Document>) -> Vec<PostDocument> {
    raw.into_iter()
        .filter_map(|doc| {
            let id = doc.get("_id").map(ToString::to_string).unwrap_or_default();
            from_document::<PostDocument>(doc)
                .inspect_err(|bson_err| warn!("skipping malformed post {id}: {bson_err}"))
                .ok()
        })
        .collect()
}

impl PostStore for MongoPostStore {
    async fn insert(&self, post: &PostDocument) -> Result<(), LivemapError> {
        self.posts.insert_one(post).await
            .inspect_err(|mongo_err| error!("error inserting new post: {mongo_err}"))?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<PostDocument>, LivemapError> {
        let post = self.posts.find_one(doc! { "_id": id }).await
            .inspect_err(|mongo_err| error!("error getting post {id}: {mongo_err}"))?;

        Ok(post)
    }

    async fn update(&self, id: &str, patch: &PostPatch, updated_at: i64) -> Result<(), LivemapError> {
        let mut set = to_document(patch).map_err(|err| LivemapError::InvalidInput(err.to_string()))?;
        set.insert("updatedAt", updated_at);

        let res = self.posts
            .update_one(doc! { "_id": id }, doc! { "$set": set })
            .await
            .inspect_err(|mongo_err| error!("error updating post {id}: {mongo_err}"))?;

        if res.matched_count == 0 {
            return Err(LivemapError::PostNotFound(id.to_string()));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), LivemapError> {
        self.posts.delete_one(doc! { "_id": id }).await
            .inspect_err(|mongo_err| error!("error deleting post {id}: {mongo_err}"))?;

        Ok(())
    }

    async fn find_since(&self, since: i64) -> Result<Vec<PostDocument>, LivemapError> {
        // untyped, so one document another client wrote badly can't fail the whole query
        let raw: Vec<Document> = self.posts.clone_with_type::<Document>()
            .find(doc! { "createdAt": { "$gte": since } })
            .sort(doc! { "createdAt": -1 })
            .await?
            .try_collect()
            .await
            .inspect_err(|mongo_err| error!("error querying posts since {since}: {mongo_err}"))?;

        Ok(decode_posts(raw))
    }

    async fn watch_since(&self, since: i64) -> Result<SnapshotStream, LivemapError> {
        // untyped events: a delete carries no document
        let changes = self.posts.clone_with_type::<Document>()
            .watch()
            .await
            .inspect_err(|mongo_err| error!("error opening change stream on posts: {mongo_err}"))?;

        let snapshots = stream::unfold(Some((self.clone(), changes, true)), move |state| async move {
            let (db, mut changes, first) = state?;

            if !first {
                match changes.next().await {
                    None => return None,
                    Some(Err(mongo_err)) => return Some((Err(mongo_err.into()), None)),
                    Some(Ok(_)) => {}
                }
            }

            match db.find_since(since).await {
                Ok(posts) => Some((Ok(posts), Some((db, changes, false)))),
                Err(err) => Some((Err(err), None)),
            }
        });

        Ok(snapshots.boxed())
    }
}
