//! HTTP periphery client

use std::time::Duration;

use async_trait::async_trait;
use periphery_api::{
    CommandResult, ContainerSummary, PeripheryRequest, CONTAINERS_PATH, EXECUTE_PATH, HEALTH_PATH,
};
use reqwest::{header, Client};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use crate::errors::CoreError;
use crate::models::server::Server;
use crate::periphery::Periphery;

/// Periphery client options
#[derive(Debug, Clone)]
pub struct Options {
    /// Bound on a health check, also used for container listings
    pub health_timeout: Duration,

    /// Bound on a dispatched action
    pub operation_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            health_timeout: Duration::from_millis(3000),
            operation_timeout: Duration::from_secs(1800),
        }
    }
}

/// Talks to periphery agents over HTTP, authenticating with each server's passkey
pub struct PeripheryClient {
    client: Client,
    options: Options,
}

impl PeripheryClient {
    pub fn new(options: Options) -> Result<Self, CoreError> {
        let client = Client::builder().build()?;
        Ok(Self { client, options })
    }

    fn endpoint(server: &Server, path: &str) -> Result<Url, CoreError> {
        server.base_url()?.join(path).map_err(|e| {
            CoreError::ValidationError(format!("invalid address for server {}: {}", server.name, e))
        })
    }

    async fn post_execute(
        &self,
        server: &Server,
        request: &PeripheryRequest,
    ) -> Result<CommandResult, String> {
        let url = Self::endpoint(server, EXECUTE_PATH).map_err(|e| e.to_string())?;
        debug!("POST {} ({})", url, request.kind());

        let response = self
            .client
            .post(url)
            .header(header::AUTHORIZATION, &server.passkey)
            .json(request)
            .send()
            .await
            .map_err(|e| format!("failed to reach periphery on {}: {}", server.name, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Periphery {} failed on {}: {} - {}", request.kind(), server.name, status, body);
            return Err(format!("periphery responded {}: {}", status, body));
        }

        response
            .json::<CommandResult>()
            .await
            .map_err(|e| format!("invalid periphery response: {}", e))
    }
}

#[async_trait]
impl Periphery for PeripheryClient {
    async fn check_health(&self, server: &Server) -> bool {
        if server.is_core {
            return true;
        }
        if !server.enabled {
            return false;
        }
        let url = match Self::endpoint(server, HEALTH_PATH) {
            Ok(url) => url,
            Err(e) => {
                warn!("Skipping health check of {}: {}", server.name, e);
                return false;
            }
        };
        let request = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, &server.passkey)
            .send();
        match tokio::time::timeout(self.options.health_timeout, request).await {
            Ok(Ok(response)) => response.status().is_success(),
            Ok(Err(e)) => {
                debug!("Health check of {} failed: {}", server.name, e);
                false
            }
            Err(_) => {
                debug!(
                    "Health check of {} timed out after {:?}",
                    server.name, self.options.health_timeout
                );
                false
            }
        }
    }

    async fn dispatch(
        &self,
        server: &Server,
        request: PeripheryRequest,
        cancel: &CancellationToken,
    ) -> CommandResult {
        let command = request.kind();
        if !server.enabled {
            return CommandResult::error(command, format!("server {} is disabled", server.name));
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                CommandResult::error(command, "periphery call cancelled")
            }
            result = tokio::time::timeout(
                self.options.operation_timeout,
                self.post_execute(server, &request),
            ) => match result {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => CommandResult::error(command, e),
                Err(_) => CommandResult::error(
                    command,
                    format!("periphery call timed out after {:?}", self.options.operation_timeout),
                ),
            },
        }
    }

    async fn container_list(&self, server: &Server) -> Result<Vec<ContainerSummary>, CoreError> {
        if !server.enabled {
            return Err(CoreError::PeripheryUnreachable(format!(
                "server {} is disabled",
                server.name
            )));
        }
        let url = Self::endpoint(server, CONTAINERS_PATH)?;
        let request = async {
            let response = self
                .client
                .get(url)
                .header(header::AUTHORIZATION, &server.passkey)
                .send()
                .await
                .map_err(|e| {
                    CoreError::PeripheryUnreachable(format!(
                        "container list on {}: {}",
                        server.name, e
                    ))
                })?;
            // the agent answered, so any failure from here on is its own
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(CoreError::RemoteCommandFailed(format!(
                    "container list on {} responded {}: {}",
                    server.name, status, body
                )));
            }
            response.json::<Vec<ContainerSummary>>().await.map_err(|e| {
                CoreError::RemoteCommandFailed(format!(
                    "invalid container list from {}: {}",
                    server.name, e
                ))
            })
        };
        match tokio::time::timeout(self.options.health_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::PeripheryUnreachable(format!(
                "container list on {} timed out",
                server.name
            ))),
        }
    }
}
