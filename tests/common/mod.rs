#![allow(dead_code)]

use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};

use axum::{body::Body, http::Request, response::Response, Router};
use tokio::net::TcpListener;

/// serves `app` on an ephemeral local port, returns its base url
pub async fn spawn_upstream(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// counts requests that reach the wrapped router
#[derive(Clone, Default)]
pub struct HitCounter(Arc<AtomicUsize>);

impl HitCounter {
    pub fn hits(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn layer(&self, app: Router) -> Router {
        let counter = self.0.clone();
        app.layer(axum::middleware::from_fn(move |req: Request<Body>, next: axum::middleware::Next| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                next.run(req).await
            }
        }))
    }
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// a base url nothing listens on
pub const DEAD_UPSTREAM: &str = "http://127.0.0.1:1";
