//! Administrative REST API for GossipChain
//!
//! Thin wrappers over the chain store and connection manager: list blocks,
//! mine a block from caller-supplied data, list and add peers. `/health` and
//! `/stats` report node state for operators.

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::blockchain::{Block, SharedChain};
use crate::error::ChainError;
use crate::network::{normalize_peer_url, NetworkNode, PeerSummary};
use crate::node::NodeState;
use crate::sync::SyncStats;

/// Handler state shared by every route
#[derive(Clone)]
pub struct Node {
    pub blockchain: SharedChain,
    pub network: Arc<NetworkNode>,
    /// Lifecycle set by `node::Node::start`; `None` reports healthy.
    pub state: Option<Arc<RwLock<NodeState>>>,
    blocks_mined: Arc<AtomicU64>,
    peers_added: Arc<AtomicU64>,
    api_stats: Arc<RwLock<ApiStats>>,
}

/// API statistics and monitoring
#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

impl Node {
    /// Creates an API node observing the given chain and network, so the
    /// HTTP surface and the gossip layer share one chain store and peer set.
    pub fn new_shared(
        blockchain: SharedChain,
        network: Arc<NetworkNode>,
        state: Option<Arc<RwLock<NodeState>>>,
    ) -> Self {
        Self {
            blockchain,
            network,
            state,
            blocks_mined: Arc::new(AtomicU64::new(0)),
            peers_added: Arc::new(AtomicU64::new(0)),
            api_stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }

    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined.load(Ordering::Relaxed)
    }

    /// Builds the next block from `data`, appends it and announces it to all peers.
    pub async fn mine_block(&self, data: String) -> Result<Block, ApiError> {
        let block = {
            let mut chain = self.blockchain.write().await;
            let block = chain.generate_next_block(data);
            if !chain.append(block.clone()) {
                return Err(ApiError::InternalError(
                    "Generated block was rejected by the chain".to_string(),
                ));
            }
            block
        };

        self.blocks_mined.fetch_add(1, Ordering::Relaxed);
        let delivered = self.network.broadcast_latest().await;
        info!(index = block.index, hash = %block.hash, delivered, "block added");
        Ok(block)
    }

    pub async fn add_peer(&self, address: &str) -> Result<String, ApiError> {
        let url = normalize_peer_url(address).map_err(|e| ApiError::InvalidInput(e.to_string()))?;
        match self.network.connect_peer(&url).await {
            Ok(peer_id) => {
                self.peers_added.fetch_add(1, Ordering::Relaxed);
                info!(%peer_id, address = %url, "peer added");
                Ok(url)
            }
            Err(e) => {
                warn!(address = %url, error = %e, "failed to add peer");
                Err(ApiError::PeerUnreachable(format!("{}: {}", url, e)))
            }
        }
    }

    pub async fn get_stats(&self) -> ApiStatsResponse {
        let stats = self.api_stats.read().await;
        let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);

        ApiStatsResponse {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            uptime_seconds: uptime,
            blocks_mined: self.blocks_mined(),
            peers_added: self.peers_added.load(Ordering::Relaxed),
            chain_length: self.blockchain.read().await.len(),
            peer_count: self.network.peers().len(),
            peers: self.network.peers().summaries(),
            sync: self.network.sync_stats(),
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    PeerUnreachable(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::PeerUnreachable(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct MineBlockRequest {
    pub data: String,
}

#[derive(Deserialize)]
pub struct AddPeerRequest {
    pub peer: String,
}

#[derive(Serialize)]
struct SuccessResponse {
    message: String,
}

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub uptime_seconds: u64,
    pub blocks_mined: u64,
    pub peers_added: u64,
    pub chain_length: usize,
    pub peer_count: usize,
    pub peers: Vec<PeerSummary>,
    pub sync: SyncStats,
}

// ============================================================================
// Middleware
// ============================================================================

/// Request statistics middleware
async fn stats_middleware(State(node): State<Arc<Node>>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    let mut stats = node.api_stats.write().await;
    stats.record_request(success);

    response
}

/// Logs method, path, status, duration and the current `NodeState` (when available).
async fn logging_middleware(
    State(node): State<Arc<Node>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    let node_state = if let Some(s) = &node.state {
        format!("{:?}", s.read().await.clone())
    } else {
        "unknown".to_string()
    };

    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        node_state = %node_state,
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the API router with all endpoints
pub fn build_api_router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/blocks", get(get_blocks))
        .route("/mine_block", post(mine_block))
        .route("/peers", get(get_peers))
        .route("/add_peer", post(add_peer))
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        // logging before stats so we always record timing and node-state
        .layer(middleware::from_fn_with_state(node.clone(), logging_middleware))
        .layer(middleware::from_fn_with_state(node.clone(), stats_middleware))
        .with_state(node)
        .layer(cors_layer())
}

/// Serves the API on an already bound listener.
pub async fn run_api_server(node: Arc<Node>, listener: TcpListener) -> Result<(), ChainError> {
    let addr = listener.local_addr()?;
    info!("API server listening on http://{}", addr);
    axum::serve(listener, build_api_router(node)).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let timestamp = chrono::Utc::now().to_rfc3339();
    match &node.state {
        Some(s) => {
            let state = s.read().await.clone();
            let (status, label) = match state {
                NodeState::Ready => (StatusCode::OK, "healthy"),
                NodeState::Booting => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
            };
            (
                status,
                Json(serde_json::json!({
                    "status": label,
                    "node_state": format!("{:?}", state),
                    "timestamp": timestamp
                })),
            )
        }
        // No orchestrator state available, assume healthy
        None => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "timestamp": timestamp
            })),
        ),
    }
}

async fn get_blocks(State(node): State<Arc<Node>>) -> Json<Vec<Block>> {
    Json(node.blockchain.read().await.blocks().to_vec())
}

async fn mine_block(
    State(node): State<Arc<Node>>,
    payload: Result<Json<MineBlockRequest>, JsonRejection>,
) -> Result<Json<Block>, ApiError> {
    let Json(req) = payload?;
    let block = node.mine_block(req.data).await?;
    Ok(Json(block))
}

async fn get_peers(State(node): State<Arc<Node>>) -> Json<Vec<String>> {
    Json(node.network.list_peers())
}

async fn add_peer(
    State(node): State<Arc<Node>>,
    payload: Result<Json<AddPeerRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(req) = payload?;
    let url = node.add_peer(&req.peer).await?;
    Ok(Json(SuccessResponse {
        message: format!("Connected to peer {}", url),
    }))
}

async fn get_api_stats(State(node): State<Arc<Node>>) -> Json<ApiStatsResponse> {
    Json(node.get_stats().await)
}
