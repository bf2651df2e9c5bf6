use std::sync::Arc;

use livemap_server::{
    config::{Config, StoreBackend},
    db::MongoPostStore,
    gateway::PostsGateway,
    geocode::GeocodeClient,
    memory::MemoryPostStore,
    server::{build_router, shutdown_signal},
    store::PostStore,
    tile_proxy::TileProxy,
    SystemClock,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv = dotenvy::dotenv();

    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(err) = dotenv {
        info!("no .env loaded ({err}), using process environment only");
    }

    let config = Config::load();

    match config.store_backend {
        StoreBackend::Mongo => {
            let db = MongoPostStore::connect(&config.mongodb_uri, &config.mongodb_db).await?;
            serve(config, db).await
        }
        StoreBackend::Memory => {
            info!("using in-memory post store, posts are lost on restart");
            serve(config, MemoryPostStore::new()).await
        }
    }
}

async fn serve<S: PostStore>(config: Config, store: S) -> Result<(), Box<dyn std::error::Error>> {
    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let gateway = PostsGateway::new(store, Arc::new(SystemClock));
    let geocoder = GeocodeClient::new(http.clone(), config.geocode_url.clone());
    let tiles = TileProxy::new(http, config.tomtom_tile_url.clone(), config.tomtom_api_key.clone());

    let app = build_router(gateway, geocoder, tiles);

    let address = config.address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("listening on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}
