//! Blob protocol handlers
//!
//! Implements the peer surface of `/blob/001`: streaming reads and writes,
//! digest recomputation, capacity probes, and the delete/acknowledge marks.
//! JSON endpoints answer the `{code, blob}` envelope; status codes follow
//! the protocol's per-endpoint whitelists.

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, put};
use futures::StreamExt;
use serde::Deserialize;
use sfs_common::{DigestAlgo, Error, NodeId, VolumeId};
use sfs_proto::wire::{TOKEN_HEADER, query};
use sfs_proto::DigestEnvelope;
use sfs_stream::{combine_delay_error, pump};
use sfs_volume::{VolumeError, VolumeStore};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Shared handler state
pub struct AppState {
    pub node_id: NodeId,
    pub store: VolumeStore,
    /// Expected value of the token header (base64 of the cluster secret)
    pub token: String,
}

/// Build the blob protocol router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/blob/001",
            get(get_blob).put(put_blob).delete(delete_blob),
        )
        .route("/blob/001/checksum", get(checksum))
        .route("/blob/001/ack", put(acknowledge))
        .route("/blob/001/canput", put(can_put))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_token,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reject requests without the cluster token
async fn require_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented == Some(state.token.as_str()) {
        next.run(request).await
    } else {
        warn!(node = %state.node_id, "request without a valid remote-node token");
        StatusCode::UNAUTHORIZED.into_response()
    }
}

/// Common query parameters of the blob endpoints
#[derive(Debug, Deserialize)]
struct BlobQuery {
    #[allow(dead_code)]
    node: Option<String>,
    volume: String,
    position: Option<u64>,
    offset: Option<u64>,
    length: Option<u64>,
    #[allow(dead_code)]
    keep_alive_timeout: Option<u64>,
}

impl BlobQuery {
    fn volume_id(&self) -> VolumeId {
        VolumeId::new_unchecked(&self.volume)
    }
}

/// Digest algorithms requested via `x-computed-digest-<algo>` flags
fn requested_algos(params: &HashMap<String, String>) -> Vec<DigestAlgo> {
    params
        .keys()
        .filter_map(|key| query::parse_computed_digest(key))
        .collect()
}

fn volume_status(error: &VolumeError) -> StatusCode {
    match error {
        VolumeError::VolumeNotFound(_) => StatusCode::NOT_FOUND,
        VolumeError::VolumeUnusable(_) | VolumeError::VolumeFull { .. } => {
            StatusCode::INSUFFICIENT_STORAGE
        }
        VolumeError::OutOfBounds { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
        VolumeError::ShortWrite { .. } | VolumeError::OverlongWrite { .. } => {
            StatusCode::BAD_REQUEST
        }
        VolumeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn volume_response(error: &VolumeError) -> Response {
    (volume_status(error), error.to_string()).into_response()
}

async fn get_blob(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BlobQuery>,
) -> Response {
    let volume = params.volume_id();
    let position = params.position.unwrap_or(0);
    match state
        .store
        .create_read_stream(&volume, position, params.offset, params.length)
        .await
    {
        Ok(Some(blob)) => {
            let length = blob.length();
            let body = Body::from_stream(blob.into_stream());
            ([(header::CONTENT_LENGTH, length.to_string())], body).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => volume_response(&e),
    }
}

async fn put_blob(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BlobQuery>,
    Query(raw): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(declared) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    else {
        return StatusCode::LENGTH_REQUIRED.into_response();
    };

    let volume = params.volume_id();
    let algos = requested_algos(&raw);
    let stream = match state.store.create_write_stream(&volume, declared, &algos) {
        Ok(stream) => stream,
        Err(e) => return volume_response(&e),
    };

    let source = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(|e| Error::storage(format!("request body: {e}"))));

    // the receipt is awaited alongside the pump so an aborted store write
    // surfaces instead of deadlocking the body
    let (mut sink, receipt) = stream.into_parts();
    let drive = async move {
        let copied = pump(source, sink.as_mut()).await;
        drop(sink);
        copied
    };
    match combine_delay_error(drive, receipt, |_copied, receipt| receipt).await {
        Ok(blob) => Json(DigestEnvelope::found(blob)).into_response(),
        Err(e) => {
            warn!(node = %state.node_id, volume = %volume, error = %e, "write stream failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn delete_blob(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BlobQuery>,
) -> Response {
    let volume = params.volume_id();
    match state.store.delete(&volume, params.position.unwrap_or(0)) {
        Ok(Some(_)) => StatusCode::NO_CONTENT.into_response(),
        Ok(None) => StatusCode::NOT_MODIFIED.into_response(),
        Err(e) => volume_response(&e),
    }
}

async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BlobQuery>,
) -> Response {
    let volume = params.volume_id();
    match state
        .store
        .acknowledge(&volume, params.position.unwrap_or(0))
    {
        Ok(Some(_)) => StatusCode::NO_CONTENT.into_response(),
        Ok(None) => StatusCode::NOT_MODIFIED.into_response(),
        Err(e) => volume_response(&e),
    }
}

async fn can_put(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BlobQuery>,
) -> Response {
    let volume = params.volume_id();
    match state.store.can_put(&volume) {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => {
            (StatusCode::INSUFFICIENT_STORAGE, "volume full").into_response()
        }
        Err(e) => volume_response(&e),
    }
}

async fn checksum(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BlobQuery>,
    Query(raw): Query<HashMap<String, String>>,
) -> Response {
    let volume = params.volume_id();
    let algos = requested_algos(&raw);
    match state
        .store
        .checksum(
            &volume,
            params.position.unwrap_or(0),
            params.offset,
            params.length,
            &algos,
        )
        .await
    {
        Ok(Some(blob)) => Json(DigestEnvelope::found(blob)).into_response(),
        Ok(None) => Json(DigestEnvelope::not_found()).into_response(),
        Err(e) => volume_response(&e),
    }
}
