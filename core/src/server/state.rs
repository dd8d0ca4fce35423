//! Server state

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use tokio_util::sync::CancellationToken;

use crate::app::state::AppState;
use crate::authn::token::bearer_token;
use crate::errors::CoreError;
use crate::models::user::User;

/// Server state shared across handlers
pub struct ServerState {
    pub app: Arc<AppState>,

    /// Fired when the core shuts down; closes live connections
    pub shutdown: CancellationToken,
}

impl ServerState {
    pub fn new(app: Arc<AppState>, shutdown: CancellationToken) -> Self {
        Self { app, shutdown }
    }

    /// Resolve the caller from the `Authorization` header
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<User, CoreError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| CoreError::Unauthorized("missing authorization header".to_string()))?
            .to_str()
            .map_err(|_| CoreError::Unauthorized("malformed authorization header".to_string()))?;
        self.authenticate_token(bearer_token(value)?).await
    }

    /// Resolve the caller from a raw token
    pub async fn authenticate_token(&self, token: &str) -> Result<User, CoreError> {
        self.app
            .authority
            .authenticate(token, self.app.registry.users.as_ref())
            .await
    }
}
