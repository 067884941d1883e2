use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ledger_core::{Block, Transaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::cluster::Peer;
use crate::error::NodeError;
use crate::node::Node;

#[derive(Clone)]
struct AppState {
    node: Arc<Node>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Head {
    pub height: u64,
    pub hash: String,
    pub difficulty: u32,
    pub next_difficulty: u32,
    /// Decimal, since cumulative work outgrows JSON numbers.
    pub work: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Roster {
    pub node_id: String,
    pub peers: Vec<Peer>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct SyncBody {
    pub peer_id: Option<String>,
}

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/blocks", get(blocks))
        .route("/mine", post(mine))
        .route("/peers", get(peers))
        .route("/chain/head", get(head))
        .route("/sync", post(sync))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { node })
}

async fn blocks(State(state): State<AppState>) -> Json<Vec<Block>> {
    Json(state.node.ledger().snapshot())
}

async fn mine(State(state): State<AppState>, body: Bytes) -> Result<Json<Vec<Block>>, ApiError> {
    let data: Vec<Transaction> = parse_optional(&body)?;
    state.node.mine(data).await?;
    Ok(Json(state.node.ledger().snapshot()))
}

async fn peers(State(state): State<AppState>) -> Json<Roster> {
    Json(Roster {
        node_id: state.node.id().to_string(),
        peers: state.node.cluster().peers(),
    })
}

async fn head(State(state): State<AppState>) -> Json<Head> {
    let ledger = state.node.ledger();
    let last = ledger.last();
    Json(Head {
        height: last.index,
        hash: last.hash,
        difficulty: last.difficulty,
        next_difficulty: ledger.next_difficulty(),
        work: ledger.chain_work().to_string(),
    })
}

async fn sync(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse, ApiError> {
    let SyncBody { peer_id } = parse_optional(&body)?;
    if let Some(id) = &peer_id {
        if state.node.cluster().peer(id).is_none() {
            return Err(NodeError::UnknownPeer(id.clone()).into());
        }
    }
    state.node.request_sync(peer_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "queued" })),
    ))
}

/// An empty body means the default value.
fn parse_optional<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError {
        status: StatusCode::BAD_REQUEST,
        message: format!("invalid request body: {e}"),
    })
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<NodeError> for ApiError {
    fn from(err: NodeError) -> Self {
        let status = match &err {
            NodeError::Block(_) => StatusCode::CONFLICT,
            NodeError::UnknownPeer(_) => StatusCode::NOT_FOUND,
            NodeError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %err, "request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
