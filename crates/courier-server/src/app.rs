use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{ConnectInfo, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use courier_gateway::{Connection, Endpoint, Gateway};

/// All routes of the relay.
pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route(Endpoint::Messaging.path(), get(messaging))
        .route(Endpoint::Registration.path(), get(registration))
        .route(Endpoint::Deletion.path(), get(deletion))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

async fn messaging(
    State(gateway): State<Gateway>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(gateway, Endpoint::Messaging, ws, addr)
}

async fn registration(
    State(gateway): State<Gateway>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(gateway, Endpoint::Registration, ws, addr)
}

async fn deletion(
    State(gateway): State<Gateway>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(gateway, Endpoint::Deletion, ws, addr)
}

fn upgrade(gateway: Gateway, endpoint: Endpoint, ws: WebSocketUpgrade, addr: SocketAddr) -> Response {
    ws.on_upgrade(move |socket| async move {
        gateway
            .handle(endpoint, Connection::from_socket(socket, addr))
            .await
    })
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub online: usize,
}

/// GET /health: `ok` while accepting sessions, `draining` once the store
/// is gone.
async fn health(State(gateway): State<Gateway>) -> impl IntoResponse {
    let status = if gateway.gate().is_open() { "ok" } else { "draining" };
    Json(Health {
        status,
        online: gateway.registry().size().await,
    })
}
