//! HTTP surfaces
//!
//! Two routers:
//! - the admin API (`/v1/...`), served on `rest_addr`
//! - the internal API (step relay, store reconfiguration), served on
//!   `internal_addr` and only called by other nodes

use crate::commands::{self, CreateVolumeRequest};
use crate::common::{Error, Result};
use crate::store::{
    etcd::RECONFIGURE_PATH, LocalStoreControl, Peer, PeerDirectory, StoreReconfigure, Volume,
    VolumeRepository,
};
use crate::txn::{RelayRequest, TxnEngine, RELAY_PATH};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<TxnEngine>,
    pub peers: Arc<dyn PeerDirectory>,
    pub volumes: Arc<dyn VolumeRepository>,
    pub store_control: Arc<LocalStoreControl>,
}

/// Creates the admin router.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/peers", get(list_peers).post(add_peer))
        .route("/v1/peers/:peerid", get(get_peer).delete(delete_peer))
        .route("/v1/volumes", get(list_volumes).post(create_volume))
        .route("/v1/volumes/:volname", get(volume_info))
        .route("/v1/volumes/:volname/start", post(start_volume))
        .route("/v1/volumes/:volname/stop", post(stop_volume))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Creates the router for node-to-node calls.
pub fn create_internal_router(state: ApiState) -> Router {
    Router::new()
        .route(RELAY_PATH, post(run_step))
        .route(RECONFIGURE_PATH, post(reconfigure_store))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "node_id": state.engine.node_id(),
        "step_functions": state.engine.registry().len(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_peers(State(state): State<ApiState>) -> Result<Json<Vec<Peer>>> {
    Ok(Json(state.peers.list()?))
}

async fn add_peer(
    State(state): State<ApiState>,
    Json(peer): Json<Peer>,
) -> Result<impl IntoResponse> {
    if peer.id == state.engine.node_id() {
        return Err(Error::InvalidRequest("cannot add self as a peer".into()));
    }
    if peer.addresses.is_empty() {
        return Err(Error::InvalidRequest("peer needs at least one address".into()));
    }
    state.peers.save(&peer)?;
    tracing::info!(peer = %peer.id, name = %peer.name, "peer recorded");
    Ok((StatusCode::CREATED, Json(peer)))
}

async fn get_peer(
    State(state): State<ApiState>,
    Path(peerid): Path<String>,
) -> Result<Json<Peer>> {
    let id = uuid::Uuid::parse_str(&peerid)
        .map_err(|_| Error::InvalidRequest(format!("invalid peer id {}", peerid)))?;
    state
        .peers
        .lookup(id)?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("peer {} not found in cluster", id)))
}

/// Run a transactional operation on its own task so a client disconnect
/// cannot drop it halfway through execution or rollback.
async fn detached<T, F>(operation: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| Error::Internal(format!("operation task failed: {}", e)))?
}

async fn delete_peer(
    State(state): State<ApiState>,
    Path(peerid): Path<String>,
) -> Result<StatusCode> {
    detached(async move {
        commands::delete_peer(&state.engine, state.peers.as_ref(), &peerid).await
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_volumes(State(state): State<ApiState>) -> Result<Json<Vec<Volume>>> {
    Ok(Json(state.volumes.list()?))
}

async fn create_volume(
    State(state): State<ApiState>,
    Json(req): Json<CreateVolumeRequest>,
) -> Result<impl IntoResponse> {
    let vol = commands::create_volume(
        state.engine.node_id(),
        state.peers.as_ref(),
        state.volumes.as_ref(),
        req,
    )?;
    Ok((StatusCode::CREATED, Json(vol)))
}

async fn volume_info(
    State(state): State<ApiState>,
    Path(volname): Path<String>,
) -> Result<Json<Volume>> {
    Ok(Json(commands::volume_info(state.volumes.as_ref(), &volname)?))
}

async fn start_volume(
    State(state): State<ApiState>,
    Path(volname): Path<String>,
) -> Result<Json<Volume>> {
    let vol = detached(async move {
        commands::start_volume(&state.engine, state.volumes.as_ref(), &volname).await
    })
    .await?;
    Ok(Json(vol))
}

async fn stop_volume(
    State(state): State<ApiState>,
    Path(volname): Path<String>,
) -> Result<Json<Volume>> {
    let vol = detached(async move {
        commands::stop_volume(&state.engine, state.volumes.as_ref(), &volname).await
    })
    .await?;
    Ok(Json(vol))
}

async fn run_step(
    State(state): State<ApiState>,
    Json(request): Json<RelayRequest>,
) -> Result<StatusCode> {
    detached(async move { state.engine.run_relayed(request).await }).await?;
    Ok(StatusCode::OK)
}

async fn reconfigure_store(
    State(state): State<ApiState>,
    Json(options): Json<StoreReconfigure>,
) -> Result<StatusCode> {
    state.store_control.apply(&options).await?;
    Ok(StatusCode::OK)
}
