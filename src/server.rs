use crate::app::Dispatcher;
use crate::domain::{Admission, DEFAULT_PAGE};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt as _, StreamExt as _};
use serde::Deserialize;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Take the observer address from `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("server error: {0}")]
    Serve(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_observer))
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "observers": state.dispatcher.observer_count().await,
        "nodes": state.dispatcher.node_count().await,
    }))
}

async fn ws_observer(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    Query(query): Query<PageQuery>,
    State(state): State<AppState>,
) -> Response {
    let ip = resolve_request_ip(&headers, peer_addr, state.trust_proxy_headers);
    let page = query
        .page
        .map(|page| page.trim().to_string())
        .filter(|page| !page.is_empty())
        .unwrap_or_else(|| DEFAULT_PAGE.to_string());

    let admission = state
        .dispatcher
        .admit(ip, &page, OffsetDateTime::now_utc());
    if admission == Admission::Rejected {
        tracing::warn!(event = "ws.rejected", ip = %ip, page = %page, "observer not allowed");
        return (StatusCode::FORBIDDEN, "not allowed").into_response();
    }

    tracing::info!(
        event = "ws.upgrade",
        ip = %ip,
        page = %page,
        admission = ?admission,
        "observer connecting"
    );
    ws.on_upgrade(move |socket| handle_socket(socket, ip, page, admission, state))
}

async fn handle_socket(
    socket: WebSocket,
    ip: IpAddr,
    page: String,
    admission: Admission,
    state: AppState,
) {
    let handle = state.dispatcher.register(ip, &page, admission).await;
    let conn_id: Uuid = handle.conn_id;
    let greeting = handle.greeting;
    let mut updates = handle.updates;
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut send_task = tokio::spawn(async move {
        if let Some(text) = greeting {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        while updates.changed().await.is_ok() {
            let text = updates.borrow_and_update().clone();
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    tracing::info!(
        event = "ws.open",
        ip = %ip,
        page = %page,
        conn_id = %conn_id,
        "observer connected"
    );

    while let Some(msg) = ws_receiver.next().await {
        let Ok(msg) = msg else {
            break;
        };
        match msg {
            Message::Text(_) | Message::Binary(_) => state.dispatcher.touch(conn_id).await,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    state.dispatcher.unregister(conn_id).await;
    tracing::info!(
        event = "ws.close",
        ip = %ip,
        page = %page,
        conn_id = %conn_id,
        "observer disconnected"
    );

    if tokio::time::timeout(Duration::from_millis(200), &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
}

fn resolve_request_ip(headers: &HeaderMap, peer_addr: SocketAddr, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            if let Some(first) = xff.split(',').next() {
                if let Ok(ip) = first.trim().parse::<IpAddr>() {
                    return ip.to_canonical();
                }
            }
        }
        if let Some(xri) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            if let Ok(ip) = xri.trim().parse::<IpAddr>() {
                return ip.to_canonical();
            }
        }
    }
    peer_addr.ip().to_canonical()
}

pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), ServeError> {
    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

pub async fn run_server(addr: SocketAddr, state: AppState) -> Result<(), ServeError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind { addr, source })?;
    tracing::info!(event = "server.listening", addr = %addr, "observer endpoint ready");
    serve(listener, state).await
}
