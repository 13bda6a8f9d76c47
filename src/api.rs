use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::chain::{LogEntry, SledStore};
use crate::drift::DriftEvent;
use crate::error::DriftError;
use crate::matcher::MatchResult;
use crate::observer::Observer;
use crate::signer::ReceiptSigner;

/// Shared application state. The observer owns the one stateful resource
/// (the chained log), so it sits behind a mutex: appends are strictly
/// serialized, while signing and verification are read-only.
pub struct AppState {
    pub signer: Arc<ReceiptSigner>,
    pub observer: Arc<Mutex<Observer<SledStore>>>,
}

#[derive(Deserialize)]
pub struct ObserveRequest {
    /// Raw captured tree, arbitrary synonym keys and all.
    pub tree: serde_json::Value,
    #[serde(default)]
    pub source: String,
}

/// Signed receipt for one observation.
#[derive(Serialize)]
pub struct ObserveReceipt {
    pub matched: MatchResult,
    pub events: Vec<DriftEvent>,
    pub chain_length: u64,
    pub tip_hash: String,
    /// Ed25519 signature over the observation entry's hash, hex encoded.
    pub signature: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub length: u64,
    pub first_invalid: Option<u64>,
}

#[derive(Deserialize)]
pub struct RangeQuery {
    #[serde(default)]
    pub start: u64,
    pub end: Option<u64>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/observe", post(observe))
        .route("/entry/{pos}", get(get_entry))
        .route("/log", get(read_log))
        .route("/verify", get(verify_chain))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn observe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ObserveRequest>,
) -> Result<Json<ObserveReceipt>, (StatusCode, String)> {
    let mut observer = state.observer.lock().await;
    let observation = observer.observe(&req.tree, &req.source).map_err(|e| match e {
        DriftError::MalformedTree(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    })?;

    // First entry is always the observation record; sign it as the
    // receipt anchor.
    let signature = state.signer.sign_entry(&observation.entries[0]);

    Ok(Json(ObserveReceipt {
        matched: observation.matched,
        events: observation.events,
        chain_length: observer.log().len(),
        tip_hash: observer.log().tip().to_hex(),
        signature: hex::encode(signature.to_bytes()),
    }))
}

async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(pos): Path<u64>,
) -> Result<Json<LogEntry>, (StatusCode, String)> {
    let observer = state.observer.lock().await;
    match observer.log().get(pos) {
        Ok(Some(entry)) => Ok(Json(entry)),
        Ok(None) => Err((StatusCode::NOT_FOUND, format!("no entry at {pos}"))),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

async fn read_log(
    State(state): State<Arc<AppState>>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<Vec<LogEntry>>, (StatusCode, String)> {
    let observer = state.observer.lock().await;
    let end = range.end.unwrap_or(observer.log().len());
    observer
        .log()
        .read(range.start, end)
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn verify_chain(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VerifyResponse>, (StatusCode, String)> {
    let observer = state.observer.lock().await;
    let length = observer.log().len();
    match observer.log().verify() {
        Ok(()) => Ok(Json(VerifyResponse {
            valid: true,
            length,
            first_invalid: None,
        })),
        Err(DriftError::ChainIntegrity { index }) => Ok(Json(VerifyResponse {
            valid: false,
            length,
            first_invalid: Some(index),
        })),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
