use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;

use super::protocol::*;
use super::server::NodeServer;
use super::types::{NodeStats, ReadResult};
use crate::error::NodeError;

/// Builds the node's HTTP router.
pub fn routes(server: Arc<NodeServer>) -> Router {
    Router::new()
        .route(ENDPOINT_GET, post(handle_get))
        .route(ENDPOINT_GET_BACKUP, post(handle_get_backup))
        .route(ENDPOINT_SET, post(handle_set))
        .route(ENDPOINT_SET_BACKUP, post(handle_set_backup))
        .route(ENDPOINT_PUSH_UPDATE, post(handle_push_update))
        .route(ENDPOINT_FAIL, post(handle_fail))
        .route(ENDPOINT_RECOVER, post(handle_recover))
        .route(ENDPOINT_PING, post(handle_ping))
        .route(ENDPOINT_NEW_NODE, post(handle_new_node))
        .route(ENDPOINT_STATS, get(handle_stats))
        .layer(Extension(server))
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status = match &self {
            NodeError::Unavailable | NodeError::NotBootstrapped => StatusCode::SERVICE_UNAVAILABLE,
            NodeError::OutOfMemory => StatusCode::INSUFFICIENT_STORAGE,
            NodeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            NodeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

fn read_response(result: ReadResult) -> Response {
    match result.record {
        Some(value) => (
            StatusCode::OK,
            Json(GetResponse {
                value,
                size: result.size,
            }),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "not found".to_string(),
            }),
        )
            .into_response(),
    }
}

pub async fn handle_get(
    Extension(server): Extension<Arc<NodeServer>>,
    Json(req): Json<GetRequest>,
) -> Result<Response, NodeError> {
    let node = server.node()?;
    let result = node.get(&req.key, &req.fields).await?;
    Ok(read_response(result))
}

pub async fn handle_get_backup(
    Extension(server): Extension<Arc<NodeServer>>,
    Json(req): Json<GetBackupRequest>,
) -> Result<Response, NodeError> {
    let node = server.node()?;
    let result = node
        .get_backup(req.origin_node_id, &req.key, &req.fields)
        .await?;
    Ok(read_response(result))
}

pub async fn handle_set(
    Extension(server): Extension<Arc<NodeServer>>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SizeResponse>, NodeError> {
    let node = server.node()?;
    let size = node.set(req.key, req.value, req.backup_node).await?;
    Ok(Json(SizeResponse { size }))
}

pub async fn handle_set_backup(
    Extension(server): Extension<Arc<NodeServer>>,
    Json(req): Json<SetBackupRequest>,
) -> Result<Json<SizeResponse>, NodeError> {
    let node = server.node()?;
    let size = node
        .set_backup(req.origin_node_id, req.key, req.value)
        .await?;
    Ok(Json(SizeResponse { size }))
}

pub async fn handle_push_update(
    Extension(server): Extension<Arc<NodeServer>>,
    Json(req): Json<PushUpdateRequest>,
) -> Result<Json<AckResponse>, NodeError> {
    let node = server.node()?;
    node.push_update(req.origin_node_id, req.key, req.value, req.access_count)
        .await?;
    Ok(Json(AckResponse::ok()))
}

pub async fn handle_fail(
    Extension(server): Extension<Arc<NodeServer>>,
) -> Result<Json<AckResponse>, NodeError> {
    server.node()?.fail();
    Ok(Json(AckResponse::ok()))
}

pub async fn handle_recover(
    Extension(server): Extension<Arc<NodeServer>>,
) -> Result<Json<AckResponse>, NodeError> {
    server.node()?.recover();
    Ok(Json(AckResponse::ok()))
}

pub async fn handle_ping(
    Extension(server): Extension<Arc<NodeServer>>,
) -> Result<Json<AckResponse>, NodeError> {
    server.node()?.ping().await?;
    Ok(Json(AckResponse::ok()))
}

pub async fn handle_new_node(
    Extension(server): Extension<Arc<NodeServer>>,
    Json(req): Json<NewNodeRequest>,
) -> Result<Json<AckResponse>, NodeError> {
    server.bootstrap(&req)?;
    Ok(Json(AckResponse::ok()))
}

pub async fn handle_stats(
    Extension(server): Extension<Arc<NodeServer>>,
) -> Result<Json<NodeStats>, NodeError> {
    Ok(Json(server.node()?.stats()))
}
