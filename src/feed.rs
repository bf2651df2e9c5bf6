//! The live feed: a standing query over recent posts, re-materialized on every change.
//!
//! Two clocks are in play. The window start (`createdAt >= now - window`) is computed once,
//! when the subscription is made, and handed to the store; it does not slide afterwards.
//! Expiry is judged against the clock at each delivery. Nothing re-fires a delivery just
//! because time passed, so an expired post only drops out of view once some other write
//! wakes the subscription up.

use std::sync::{atomic::{AtomicBool, Ordering}, Arc};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{gateway::PostsGateway, store::PostStore, types::{Post, PostDocument}, LivemapError};

/// windows the client may pick from
pub const FEED_WINDOWS_MINUTES: [u32; 4] = [10, 30, 60, 180];

pub fn window_start(now_ms: i64, window_minutes: u32) -> i64 {
    now_ms - i64::from(window_minutes) * 60_000
}

/// turns one raw snapshot into what the client sees: username defaulted,
/// expired posts dropped, newest first
pub fn materialize(docs: Vec<PostDocument>, now_ms: i64) -> Vec<Post> {
    let mut posts: Vec<Post> = docs
        .into_iter()
        .filter_map(Post::from_document)
        .filter(|post| post.is_live(now_ms))
        .collect();

    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    posts
}

/// dropping this detaches the listener.
///
/// once `unsubscribe` (or drop) returns the callback is not called again. a call that
/// was already running on another thread at that moment still runs to completion
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<S: PostStore> PostsGateway<S> {
    /// live posts created in the last `window_minutes`, handed to `callback` in full on every change.
    ///
    /// if the store stops being able to answer, the error is handed over once and the
    /// feed ends there
    pub async fn subscribe<F>(&self, window_minutes: u32, mut callback: F) -> Result<Subscription, LivemapError>
    where
        F: FnMut(Result<Vec<Post>, LivemapError>) + Send + 'static,
    {
        let since = window_start(self.clock.now_ms(), window_minutes);
        let mut snapshots = self.store.watch_since(since).await?;
        let clock = self.clock.clone();
        let cancelled = Arc::new(AtomicBool::new(false));

        debug!("feed subscribed with window of {window_minutes} minutes, since {since}");

        let stopped = cancelled.clone();
        let task = tokio::spawn(async move {
            while let Some(snapshot) = snapshots.next().await {
                // a stream that is always ready never yields, so abort alone can't stop this loop
                if stopped.load(Ordering::SeqCst) {
                    break;
                }

                match snapshot {
                    Ok(docs) => callback(Ok(materialize(docs, clock.now_ms()))),
                    Err(err) => {
                        warn!("live feed stopped: {err}");
                        callback(Err(err));
                        break;
                    }
                }
            }
        });

        Ok(Subscription { task, cancelled })
    }

    /// one-off read with the same policy as the live feed
    pub async fn live_posts(&self, window_minutes: u32) -> Result<Vec<Post>, LivemapError> {
        let now = self.clock.now_ms();
        let docs = self.store.find_since(window_start(now, window_minutes)).await?;
        Ok(materialize(docs, now))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use futures::stream;
    use tokio::{sync::mpsc, time::timeout};

    use super::*;
    use crate::{
        memory::MemoryPostStore,
        Clock,
        store::SnapshotStream,
        types::{NewPost, PostPatch, PostType},
        ManualClock,
    };

    const T0: i64 = 1_700_000_000_000;
    const MINUTE: i64 = 60_000;

    fn doc(id: &str, created_at: i64, expires_at: Option<i64>) -> PostDocument {
        PostDocument {
            id: id.into(),
            kind: PostType::Construction,
            text: None,
            lat: 1.0,
            lng: 2.0,
            created_at,
            expires_at,
            image_url: None,
            username: None,
            updated_at: None,
        }
    }

    fn new_post(ttl_minutes: Option<u32>) -> NewPost {
        NewPost {
            kind: PostType::Traffic,
            text: None,
            lat: -6.2,
            lng: 106.8,
            image_url: None,
            username: Some("Driver".into()),
            ttl_minutes,
        }
    }

    fn gateway() -> (PostsGateway<MemoryPostStore>, ManualClock) {
        let clock = ManualClock::new(T0);
        (PostsGateway::new(MemoryPostStore::new(), Arc::new(clock.clone())), clock)
    }

    type Delivery = Result<Vec<Post>, LivemapError>;

    fn collect() -> (impl FnMut(Delivery) + Send + 'static, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (move |snapshot: Delivery| { let _ = tx.send(snapshot); }, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Vec<Post> {
        timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap().expect("feed delivered an error")
    }

    fn storage_failure() -> LivemapError {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "replica set went away");
        LivemapError::from(mongodb::error::Error::from(io_err))
    }

    /// a store whose standing query plays back a fixed list of snapshots, then goes quiet
    #[derive(Clone)]
    struct ScriptedStore {
        script: Arc<Mutex<Vec<Result<Vec<PostDocument>, LivemapError>>>>,
    }

    impl ScriptedStore {
        fn gateway(script: Vec<Result<Vec<PostDocument>, LivemapError>>) -> PostsGateway<Self> {
            let store = Self { script: Arc::new(Mutex::new(script)) };
            PostsGateway::new(store, Arc::new(ManualClock::new(T0)))
        }
    }

    impl PostStore for ScriptedStore {
        async fn insert(&self, _: &PostDocument) -> Result<(), LivemapError> {
            Ok(())
        }

        async fn get(&self, _: &str) -> Result<Option<PostDocument>, LivemapError> {
            Ok(None)
        }

        async fn update(&self, id: &str, _: &PostPatch, _: i64) -> Result<(), LivemapError> {
            Err(LivemapError::PostNotFound(id.to_string()))
        }

        async fn delete(&self, _: &str) -> Result<(), LivemapError> {
            Ok(())
        }

        async fn find_since(&self, _: i64) -> Result<Vec<PostDocument>, LivemapError> {
            Ok(Vec::new())
        }

        async fn watch_since(&self, _: i64) -> Result<SnapshotStream, LivemapError> {
            let script = std::mem::take(&mut *self.script.lock().unwrap());
            Ok(stream::iter(script).chain(stream::pending()).boxed())
        }
    }

    fn ids(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn materialize_drops_expired_and_sorts() {
        let docs = vec![
            doc("old", T0 - 20 * MINUTE, Some(T0 - 10 * MINUTE)),
            doc("mid", T0 - 5 * MINUTE, Some(T0 + 5 * MINUTE)),
            doc("edge", T0 - 10 * MINUTE, Some(T0)),
            doc("new", T0, Some(T0 + 10 * MINUTE)),
            doc("no-expiry", T0, None),
        ];

        let posts = materialize(docs, T0);
        assert_eq!(ids(&posts), ["new", "mid", "edge"]);
        assert!(posts.iter().all(|p| p.username == "Anonymous"));
    }

    #[test]
    fn window_start_is_minutes_back() {
        assert_eq!(window_start(T0, 30), T0 - 30 * MINUTE);
    }

    #[tokio::test]
    async fn post_older_than_its_lifetime_never_shows_despite_long_ttl() {
        let (gateway, clock) = gateway();
        let post = gateway.create(new_post(Some(60))).await.unwrap();
        let stored = gateway.get(&post.id).await.unwrap().unwrap();

        clock.advance_minutes(11);

        assert!(gateway.live_posts(10).await.unwrap().is_empty());
        assert!(gateway.live_posts(180).await.unwrap().is_empty());
        assert!(materialize(vec![stored], clock.now_ms()).is_empty());
    }

    #[tokio::test]
    async fn delivers_initial_snapshot_and_full_list_on_each_change() {
        let (gateway, clock) = gateway();
        let first = gateway.create(new_post(None)).await.unwrap();

        let (callback, mut rx) = collect();
        let _sub = gateway.subscribe(10, callback).await.unwrap();
        assert_eq!(ids(&next(&mut rx).await), [first.id.as_str()]);

        clock.advance_minutes(1);
        let second = gateway.create(new_post(None)).await.unwrap();
        assert_eq!(ids(&next(&mut rx).await), [second.id.as_str(), first.id.as_str()]);

        gateway.delete(&first.id).await.unwrap();
        assert_eq!(ids(&next(&mut rx).await), [second.id.as_str()]);
    }

    #[tokio::test]
    async fn time_passing_alone_does_not_redeliver() {
        let (gateway, clock) = gateway();
        let post = gateway.create(new_post(None)).await.unwrap();

        let (callback, mut rx) = collect();
        let _sub = gateway.subscribe(30, callback).await.unwrap();
        assert_eq!(next(&mut rx).await.len(), 1);

        // expired now, but nobody wrote anything
        clock.advance_minutes(11);
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

        // the next unrelated write prunes it
        let fresh = gateway.create(new_post(None)).await.unwrap();
        let posts = next(&mut rx).await;
        assert_eq!(ids(&posts), [fresh.id.as_str()]);
        assert!(!ids(&posts).contains(&post.id.as_str()));
    }

    #[tokio::test]
    async fn window_start_is_fixed_at_subscription_time() {
        let (gateway, clock) = gateway();
        let store = gateway.store().clone();

        // long-lived foreign documents so only the window decides
        store.insert(&doc("outside", T0 - 20 * MINUTE, Some(T0 + 600 * MINUTE))).await.unwrap();
        store.insert(&doc("inside", T0 - 5 * MINUTE, Some(T0 + 600 * MINUTE))).await.unwrap();

        let (callback, mut rx) = collect();
        let _sub = gateway.subscribe(10, callback).await.unwrap();
        assert_eq!(ids(&next(&mut rx).await), ["inside"]);

        // "inside" is now 25 minutes old, well past a sliding 10 minute window
        clock.advance_minutes(20);
        store.insert(&doc("later", clock.now_ms(), Some(clock.now_ms() + 10 * MINUTE))).await.unwrap();
        assert_eq!(ids(&next(&mut rx).await), ["later", "inside"]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_deliveries() {
        let (gateway, _) = gateway();

        let (callback, mut rx) = collect();
        let sub = gateway.subscribe(10, callback).await.unwrap();
        assert!(next(&mut rx).await.is_empty());

        sub.unsubscribe();
        gateway.create(new_post(None)).await.unwrap();

        // the callback (and its sender) is dropped with the aborted task
        assert!(timeout(Duration::from_secs(1), rx.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_failure_is_handed_over_once_and_ends_the_feed() {
        let snapshot = vec![doc("a", T0, Some(T0 + 10 * MINUTE))];
        let gateway = ScriptedStore::gateway(vec![
            Ok(snapshot.clone()),
            Err(storage_failure()),
            Ok(snapshot.clone()),
            Ok(snapshot),
        ]);

        let (callback, mut rx) = collect();
        let _sub = gateway.subscribe(10, callback).await.unwrap();
        assert_eq!(ids(&next(&mut rx).await), ["a"]);

        let err = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap().unwrap_err();
        assert_eq!(err.to_status_code(), 500);

        // the snapshots after the failure are never delivered, the callback is gone with the task
        assert!(timeout(Duration::from_secs(1), rx.recv()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn no_delivery_starts_after_unsubscribe_returns() {
        let snapshot = vec![doc("a", T0, Some(T0 + 10 * MINUTE))];
        let gateway = ScriptedStore::gateway(vec![Ok(snapshot.clone()), Ok(snapshot)]);

        let (started_tx, mut started) = mpsc::unbounded_channel();
        let (release, held) = std::sync::mpsc::channel::<()>();
        let sub = gateway.subscribe(10, move |snapshot: Delivery| {
            let _ = started_tx.send(snapshot.is_ok());
            // keep the first delivery running until the test has unsubscribed
            let _ = held.recv();
        }).await.unwrap();

        assert_eq!(timeout(Duration::from_secs(1), started.recv()).await.unwrap(), Some(true));
        sub.unsubscribe();
        release.send(()).unwrap();

        // the second snapshot was already waiting, it must not reach the callback
        assert!(timeout(Duration::from_secs(1), started.recv()).await.unwrap().is_none());
    }
}
