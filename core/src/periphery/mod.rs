//! Communication with periphery agents

pub mod client;

use async_trait::async_trait;
use periphery_api::{CommandResult, ContainerSummary, PeripheryRequest};
use tokio_util::sync::CancellationToken;

use crate::errors::CoreError;
use crate::models::server::Server;

/// Contract between the core and the agent of one server
#[async_trait]
pub trait Periphery: Send + Sync {
    /// Whether the agent and its docker daemon are reachable. Never errors.
    async fn check_health(&self, server: &Server) -> bool;

    /// Run one action on the agent. Failures of any kind come back as an
    /// error result, never as `Err`.
    async fn dispatch(
        &self,
        server: &Server,
        request: PeripheryRequest,
        cancel: &CancellationToken,
    ) -> CommandResult;

    /// Containers known to the agent's docker daemon
    async fn container_list(&self, server: &Server) -> Result<Vec<ContainerSummary>, CoreError>;
}
