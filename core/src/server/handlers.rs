//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::actions::executor::ExecuteRequest;
use crate::api::execute::{self, ExecuteResponse};
use crate::api::read::{self, ReadRequest};
use crate::api::write::{self, WriteRequest};
use crate::errors::CoreError;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Error body returned by every API route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// A [`CoreError`] rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(CoreError::ValidationError(rejection.body_text()))
    }
}

/// Status code of an error kind
pub fn status_code(err: &CoreError) -> StatusCode {
    match err {
        CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        CoreError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        CoreError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::ActionInProgress { .. } => StatusCode::CONFLICT,
        CoreError::ValidationError(_) => StatusCode::BAD_REQUEST,
        CoreError::PeripheryUnreachable(_) | CoreError::RemoteCommandFailed(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_code(&self.0);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "dockhand-core".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// `POST /read`
pub async fn read_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    request: Result<Json<ReadRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let user = state.authenticate(&headers).await?;
    let Json(request) = request?;
    Ok(Json(read::handle(&state.app, &user, request).await?))
}

/// `POST /write`
pub async fn write_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    request: Result<Json<WriteRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let user = state.authenticate(&headers).await?;
    let Json(request) = request?;
    Ok(Json(write::handle(&state.app, &user, request).await?))
}

/// `POST /execute`
pub async fn execute_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    request: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let user = state.authenticate(&headers).await?;
    let Json(request) = request?;
    Ok(Json(execute::handle(&state.app, &user, request).await?))
}
