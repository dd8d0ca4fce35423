//! Execute operations

use serde::{Deserialize, Serialize};

use crate::actions::executor::{ExecuteRequest, Execution};
use crate::actions::state::ActionKind;
use crate::app::state::AppState;
use crate::errors::CoreError;
use crate::models::update::ResourceTarget;
use crate::models::user::User;

/// Body returned by `POST /execute`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecuteResponse {
    Started {
        update_id: String,
    },
    Cancelled {
        cancelled: bool,
        target: ResourceTarget,
        action: ActionKind,
    },
}

/// Serve an execute request. Runs continue in the background; the caller
/// follows them through the update id.
pub async fn handle(
    state: &AppState,
    user: &User,
    request: ExecuteRequest,
) -> Result<ExecuteResponse, CoreError> {
    match state.executor.execute(user, request).await? {
        Execution::Started(handle) => Ok(ExecuteResponse::Started {
            update_id: handle.update_id,
        }),
        Execution::Cancelled { target, action } => Ok(ExecuteResponse::Cancelled {
            cancelled: true,
            target,
            action,
        }),
    }
}
