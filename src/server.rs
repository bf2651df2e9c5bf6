use axum::middleware;
use socketioxide::{extract::SocketRef, SocketIo};
use tokio::signal::ctrl_c;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::{
    clone_into_closure,
    endpoints::get_endpoints_router,
    gateway::PostsGateway,
    geocode::GeocodeClient,
    socket::on_socket_connect,
    store::PostStore,
    tile_proxy::{tile_proxy_layer, TileProxy},
};

pub fn build_router<S: PostStore>(gateway: PostsGateway<S>, geocoder: GeocodeClient, tiles: TileProxy) -> axum::Router {
    let (socketio_layer, io) = SocketIo::new_layer();

    io.ns("/", clone_into_closure! {
        (gateway, geocoder)
        move |client_socket: SocketRef| on_socket_connect(client_socket, &gateway, &geocoder)
    });

    axum::Router::new()
        .merge(get_endpoints_router(&gateway, &geocoder))
        .layer(socketio_layer)
        .layer(middleware::from_fn_with_state(tiles, tile_proxy_layer))
        .layer(CorsLayer::permissive())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => { sigterm.recv().await; }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
        info!("received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
