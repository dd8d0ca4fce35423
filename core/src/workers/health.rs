//! Health monitor: periodically checks every server's periphery agent and
//! stores the outcome on the server record

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, info};

use crate::errors::CoreError;
use crate::models::server::ServerStatus;
use crate::periphery::Periphery;
use crate::resources::registry::ResourceRegistry;

/// Health monitor options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between sweeps
    pub interval: Duration,

    /// Initial delay before the first sweep
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            initial_delay: Duration::from_secs(1),
        }
    }
}

/// Check every server once. Returns the number of status changes.
pub async fn sweep(
    registry: &ResourceRegistry,
    periphery: &dyn Periphery,
) -> Result<usize, CoreError> {
    let servers = registry.servers.list().await?;
    let checks = servers.iter().map(|server| async move {
        let healthy = periphery.check_health(server).await;
        (server.id.clone(), healthy)
    });

    let mut changed = 0;
    for (server_id, healthy) in join_all(checks).await {
        let status = if healthy {
            ServerStatus::Ok
        } else {
            ServerStatus::NotOk
        };
        match registry.set_server_status(&server_id, status).await {
            Ok(true) => changed += 1,
            Ok(false) => {}
            // deleted while the check was running
            Err(CoreError::ResourceNotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(changed)
}

/// Run the health monitor
pub async fn run<S, F>(
    options: &Options,
    registry: &ResourceRegistry,
    periphery: &dyn Periphery,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Health monitor starting...");

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Health monitor shutting down...");
            return;
        }
        _ = sleep_fn(options.initial_delay) => {}
    }

    loop {
        debug!("Checking server health...");
        match sweep(registry, periphery).await {
            Ok(changed) => debug!("Health sweep done, {} status changes", changed),
            Err(e) => error!("Health sweep failed: {}", e),
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Health monitor shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}
