//! Error types for the dockhand core

use thiserror::Error;

use crate::actions::state::ActionKind;
use crate::models::update::ResourceTarget;

/// Main error type for the dockhand core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Action {action} already in progress on {target}")]
    ActionInProgress {
        target: ResourceTarget,
        action: ActionKind,
    },

    #[error("Periphery unreachable: {0}")]
    PeripheryUnreachable(String),

    #[error("Remote command failed: {0}")]
    RemoteCommandFailed(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Update already complete: {0}")]
    UpdateAlreadyComplete(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Short machine readable name, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::PermissionDenied(_) => "PermissionDenied",
            CoreError::ActionInProgress { .. } => "ActionInProgress",
            CoreError::PeripheryUnreachable(_) => "PeripheryUnreachable",
            CoreError::RemoteCommandFailed(_) => "RemoteCommandFailed",
            CoreError::ResourceNotFound(_) => "ResourceNotFound",
            CoreError::ValidationError(_) => "ValidationError",
            CoreError::Unauthorized(_) => "Unauthorized",
            CoreError::UpdateAlreadyComplete(_) => "UpdateAlreadyComplete",
            CoreError::StorageError(_) => "StorageError",
            CoreError::ConfigError(_) => "ConfigError",
            CoreError::ServerError(_) => "ServerError",
            CoreError::ShutdownError(_) => "ShutdownError",
            CoreError::IoError(_) => "IoError",
            CoreError::JsonError(_) => "JsonError",
            CoreError::HttpError(_) => "HttpError",
            CoreError::Internal(_) => "Internal",
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Internal(format!("{err:#}"))
    }
}
