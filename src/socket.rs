use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use socketioxide::extract::{AckSender, Data, SocketRef};
use tracing::{debug, info, warn};

use crate::{
    clone_into_closure,
    debounce::{Debouncer, SEARCH_DEBOUNCE},
    endpoints::check_window,
    feed::Subscription,
    gateway::PostsGateway,
    geocode::GeocodeClient,
    store::PostStore,
    types::{NewPost, Post, PostPatch, Suggestion},
    LivemapError,
};

#[derive(Deserialize, Debug)]
struct FeedData {
    minutes: u32,
}

#[derive(Deserialize, Debug)]
struct EditPostData {
    id: String,
    #[serde(flatten)]
    patch: PostPatch,
}

#[derive(Deserialize, Debug)]
struct MovePostData {
    id: String,
    lat: f64,
    lng: f64,
}

#[derive(Deserialize, Debug)]
struct DeletePostData {
    id: String,
}

#[derive(Deserialize, Debug)]
struct SearchData {
    query: String,
}

/// the socket's one live feed.
///
/// every `subscribe-feed` takes a ticket, and so does every teardown. a subscription only
/// gets installed, and its callback only emits, while its ticket is the newest one. that
/// way two window switches racing each other leave the later one running and nothing else
#[derive(Debug, Default)]
struct FeedSlot {
    ticket: u64,
    current: Option<Subscription>,
}

impl FeedSlot {
    /// drops the running feed and hands out the ticket its replacement has to present
    fn begin(&mut self) -> u64 {
        self.clear();
        self.ticket
    }

    fn clear(&mut self) {
        self.ticket += 1;
        self.current = None;
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.ticket == ticket
    }

    /// false (and `subscription` dropped) if something newer came along in the meantime
    fn install(&mut self, ticket: u64, subscription: Subscription) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.current = Some(subscription);
        true
    }
}

/// what one connected client owns: at most one live feed and one pending search timer
struct Session {
    feed: FeedSlot,
    search: Debouncer,
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn emit<T: Serialize + ?Sized>(client_socket: &SocketRef, event: &str, data: &T) {
    if let Err(err) = client_socket.emit(event, data) {
        warn!("failed to emit {event} to {}: {err}", client_socket.id);
    }
}

fn ack_with<T: Serialize + ?Sized>(ack: AckSender, data: &T) {
    if let Err(err) = ack.send(data) {
        debug!("failed to ack: {err}");
    }
}

/// hands one feed delivery to the client, unless a newer subscribe or a teardown got there first.
/// a failed feed is reported once as `feed-error` and then forgotten
fn deliver(client_socket: &SocketRef, session: &Mutex<Session>, ticket: u64, snapshot: Result<Vec<Post>, LivemapError>) {
    let mut session = lock(session);
    if !session.feed.is_current(ticket) {
        return;
    }

    match snapshot {
        Ok(posts) => emit(client_socket, "posts", &posts),
        Err(err) => {
            session.feed.clear();
            emit(client_socket, "feed-error", &err.to_string());
        }
    }
}

pub fn on_socket_connect<S: PostStore>(client_socket: SocketRef, gateway: &PostsGateway<S>, geocoder: &GeocodeClient) {

    info!("socket {} connected", client_socket.id);

    let session = Arc::new(Mutex::new(Session {
        feed: FeedSlot::default(),
        search: Debouncer::new(SEARCH_DEBOUNCE),
    }));

    // (re)starts this socket's live feed. the old listener goes away before the new one
    // exists, so writes landing in between are only seen in the new initial snapshot
    client_socket.on(
        "subscribe-feed",
        clone_into_closure! {
            (gateway, session)
            |client_socket: SocketRef, Data(FeedData { minutes }): Data<FeedData>, ack: AckSender| async move {
                let minutes = match check_window(minutes) {
                    Ok(minutes) => minutes,
                    Err(err) => return ack_with(ack, &err.to_status_code()),
                };

                let ticket = lock(&session).feed.begin();

                let subscribed = gateway.subscribe(minutes, clone_into_closure! {
                    (session)
                    move |snapshot: Result<Vec<Post>, LivemapError>| deliver(&client_socket, &session, ticket, snapshot)
                }).await;

                match subscribed {
                    Ok(subscription) => {
                        if !lock(&session).feed.install(ticket, subscription) {
                            debug!("feed of {minutes} minutes was replaced or failed before it started");
                        }
                        ack_with(ack, &200);
                    }
                    Err(err) => ack_with(ack, &err.to_status_code()),
                }
            }
        }
    );

    client_socket.on(
        "unsubscribe-feed",
        clone_into_closure! {
            (session)
            move |_: SocketRef| lock(&session).feed.clear()
        }
    );

    client_socket.on(
        "create-post",
        clone_into_closure! {
            (gateway)
            |Data(input): Data<NewPost>, ack: AckSender| async move {
                match gateway.create(input).await {
                    Ok(post) => ack_with(ack, &post),
                    Err(err) => ack_with(ack, &err.to_status_code()),
                }
            }
        }
    );

    client_socket.on(
        "edit-post",
        clone_into_closure! {
            (gateway)
            |Data(EditPostData { id, patch }): Data<EditPostData>, ack: AckSender| async move {
                match gateway.update(&id, patch).await {
                    Ok(()) => ack_with(ack, &200),
                    Err(err) => ack_with(ack, &err.to_status_code()),
                }
            }
        }
    );

    client_socket.on(
        "move-post",
        clone_into_closure! {
            (gateway)
            |Data(MovePostData { id, lat, lng }): Data<MovePostData>, ack: AckSender| async move {
                match gateway.update_location(&id, lat, lng).await {
                    Ok(()) => ack_with(ack, &200),
                    Err(err) => ack_with(ack, &err.to_status_code()),
                }
            }
        }
    );

    client_socket.on(
        "delete-post",
        clone_into_closure! {
            (gateway)
            |Data(DeletePostData { id }): Data<DeletePostData>, ack: AckSender| async move {
                match gateway.delete(&id).await {
                    Ok(()) => ack_with(ack, &200),
                    Err(err) => ack_with(ack, &err.to_status_code()),
                }
            }
        }
    );

    // search-as-you-type. the lookup itself is never cancelled, whichever response lands last wins
    client_socket.on(
        "search",
        clone_into_closure! {
            (geocoder, session)
            move |client_socket: SocketRef, Data(SearchData { query }): Data<SearchData>| {
                let mut session = lock(&session);

                if query.trim().is_empty() {
                    session.search.cancel();
                    emit(&client_socket, "suggestions", &Vec::<Suggestion>::new());
                    return;
                }

                session.search.schedule(async move {
                    match geocoder.suggest(&query).await {
                        Ok(suggestions) => emit(&client_socket, "suggestions", &suggestions),
                        Err(err) => {
                            warn!("search for {query:?} failed: {err}");
                            emit(&client_socket, "search-error", &err.to_string());
                        }
                    }
                });
            }
        }
    );

    client_socket.on_disconnect(clone_into_closure! {
        (session)
        move |client_socket: SocketRef| {
            let mut session = lock(&session);
            session.feed.clear();
            session.search.cancel();
            info!("socket {} disconnected", client_socket.id);
        }
    });
}
