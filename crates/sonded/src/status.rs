//! HTTP status endpoint — exposes node state as JSON and accepts commands.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{extract::State, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tower_http::cors::{Any, CorsLayer};

use sonde_core::{Command, NodeParams, PeerRecord};
use sonde_services::{node, Envelope, RoleArbiter, SharedRegistry, TickClock};

#[derive(Clone)]
pub struct StatusState {
    pub registry: SharedRegistry,
    pub arbiter: Arc<RoleArbiter>,
    pub params: watch::Receiver<NodeParams>,
    pub clock: TickClock,
    pub commands: mpsc::Sender<Envelope>,
    pub shutdown: broadcast::Sender<()>,
}

// ── /status ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub ranging: &'static str,
    pub discovery: &'static str,
    pub params: NodeParams,
    pub peers: usize,
    pub uptime_ticks: u32,
}

async fn handle_status(State(state): State<StatusState>) -> Json<StatusResponse> {
    let params = state.params.borrow().clone();
    let peers = state.registry.lock().await.len();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        ranging: state.arbiter.ranging_state().as_str(),
        discovery: state.arbiter.discovery_state().as_str(),
        params,
        peers,
        uptime_ticks: state.clock.now(),
    })
}

// ── /peers ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerRecord>,
}

/// Read-only view; delta telemetry state is left alone.
async fn handle_peers(State(state): State<StatusState>) -> Json<PeersResponse> {
    let peers = state.registry.lock().await.iter().copied().collect();
    Json(PeersResponse { peers })
}

// ── /command ──────────────────────────────────────────────────────────────────

async fn handle_command(
    State(state): State<StatusState>,
    body: String,
) -> Result<String, (StatusCode, String)> {
    let command: Command = body
        .parse()
        .map_err(|e: sonde_core::LexError| (StatusCode::BAD_REQUEST, e.to_string()))?;
    tracing::info!(command = %command, "command received via API");
    node::submit(&state.commands, command)
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
}

// ── /daemon/shutdown ──────────────────────────────────────────────────────────

async fn handle_shutdown(State(state): State<StatusState>) -> &'static str {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown.send(());
    "Shutdown initiated"
}

pub fn router(state: StatusState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handle_status))
        .route("/peers", get(handle_peers))
        .route("/command", post(handle_command))
        .route("/daemon/shutdown", post(handle_shutdown))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn serve(state: StatusState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
