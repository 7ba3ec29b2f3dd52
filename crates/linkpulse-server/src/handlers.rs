//! HTTP and WebSocket handlers for the LinkPulse server.
//!
//! This module wires the hub to the outside world: the analytics WebSocket,
//! the producer ingestion endpoints and the introspection routes.

use crate::analytics::{run_pruner, MemoryAnalytics, PRUNE_INTERVAL};
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::StreamExt;
use linkpulse_core::{run_session, ClickEvent, HubError, HubHandle};
use linkpulse_protocol::validate_short_code;
use linkpulse_transport::{
    websocket::run_writer, ConnectionHandle, ConnectionId, WebSocketConfig, WebSocketConnection,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Entry point into the hub.
    pub hub: HubHandle,
    /// Store backing snapshots and fed by the ingestion endpoints.
    pub analytics: Arc<MemoryAnalytics>,
    /// Server configuration.
    pub config: Config,
    /// Parent of every connection's close token.
    pub token: CancellationToken,
}

/// Body of `POST /events/click`.
#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    pub short_code: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub referrer: String,
}

/// Body of `POST /events/conversion`.
#[derive(Debug, Deserialize)]
pub struct ConversionRequest {
    pub short_code: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();
    Router::new()
        .route(&ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/events/click", post(click_handler))
        .route("/events/conversion", post(conversion_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("LinkPulse server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    serve(listener, config, token).await
}

/// Serve on an already bound listener until `token` is cancelled.
///
/// # Errors
///
/// Returns an error if the listener fails.
pub async fn serve(listener: TcpListener, config: Config, token: CancellationToken) -> Result<()> {
    let analytics = Arc::new(MemoryAnalytics::new());
    let (hub, hub_task) = linkpulse_core::spawn(config.hub_config(), analytics.clone(), token.clone());
    tokio::spawn(run_pruner(Arc::clone(&analytics), PRUNE_INTERVAL, token.clone()));

    let state = Arc::new(AppState {
        hub,
        analytics,
        config,
        token: token.clone(),
    });
    let app = router(state);

    let shutdown = token.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    // The hub closes every connection on its way out.
    token.cancel();
    if let Err(e) = hub_task.await {
        error!("Hub task failed: {}", e);
    }
    info!("Server stopped");
    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Introspection handler.
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connections = state.hub.active_connection_count().await;
    let subscriptions = state.hub.active_subscription_counts().await;

    match (connections, subscriptions) {
        (Ok(connections), Ok(subscriptions)) => (
            StatusCode::OK,
            Json(json!({
                "active_connections": connections,
                "subscriptions": subscriptions,
            })),
        ),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": HubError::Closed.to_string() })),
        ),
    }
}

/// Click ingestion handler.
async fn click_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClickRequest>,
) -> impl IntoResponse {
    if let Err(reason) = validate_short_code(&request.short_code) {
        metrics::record_event("click", "rejected");
        return bad_request(reason);
    }

    let event = ClickEvent {
        ip_address: request.ip_address,
        user_agent: request.user_agent,
        referrer: request.referrer,
    };
    state
        .analytics
        .record_click(&request.short_code, &event, Utc::now());

    let result = state.hub.broadcast_click(
        &request.short_code,
        &event.ip_address,
        &event.user_agent,
        &event.referrer,
    );
    broadcast_response("click", result)
}

/// Conversion ingestion handler.
async fn conversion_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConversionRequest>,
) -> impl IntoResponse {
    if let Err(reason) = validate_short_code(&request.short_code) {
        metrics::record_event("conversion", "rejected");
        return bad_request(reason);
    }

    let value = request
        .data
        .get("value")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(0.0);
    state
        .analytics
        .record_conversion(&request.short_code, value, Utc::now());

    let result = state
        .hub
        .broadcast_conversion(&request.short_code, request.data);
    broadcast_response("conversion", result)
}

fn bad_request(reason: &str) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": reason })))
}

fn broadcast_response(
    kind: &'static str,
    result: Result<(), HubError>,
) -> (StatusCode, Json<serde_json::Value>) {
    match result {
        Ok(()) => {
            metrics::record_event(kind, "accepted");
            (StatusCode::ACCEPTED, Json(json!({ "accepted": true })))
        }
        Err(HubError::QueueFull(_)) => {
            metrics::record_event(kind, "dropped");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "accepted": false, "dropped": true })),
            )
        }
        Err(e) => {
            metrics::record_event(kind, "failed");
            metrics::record_error("hub_closed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "accepted": false, "error": e.to_string() })),
            )
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let max_size = state.config.transport.max_message_size;
    ws.max_message_size(max_size)
        .on_upgrade(move |socket| handle_websocket(socket, addr, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, addr: SocketAddr, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    debug!(connection = %connection_id, remote = %addr, "WebSocket connected");

    let ws_config: WebSocketConfig = state.config.websocket_config();
    let (handle, outbound) = ConnectionHandle::channel(
        connection_id.clone(),
        state.config.hub.outbound_capacity,
        ws_config.write_timeout,
        &state.token,
    );

    // Split the WebSocket
    let (sink, stream) = socket.split();
    let writer = tokio::spawn(run_writer(
        sink,
        outbound,
        handle.token().clone(),
        ws_config.write_timeout,
    ));

    let conn = WebSocketConnection::new(stream, &ws_config).with_remote_addr(addr);
    run_session(conn, handle, state.hub.clone()).await;

    if let Err(e) = writer.await {
        warn!(connection = %connection_id, error = %e, "Writer task failed");
        metrics::record_error("writer");
    }

    debug!(connection = %connection_id, "WebSocket disconnected");
}
