//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::CoreError;
use crate::server::serve::{bind, serve};
use crate::server::state::ServerState;
use crate::workers::health;

/// Run the dockhand core until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), CoreError> {
    info!("Initializing dockhand core...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager =
        ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start core: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, CoreError> {
    let app_state = Arc::new(AppState::init(options).await?);
    shutdown_manager.with_app_state(app_state.clone())?;

    init_health_worker(
        options.health_worker.clone(),
        app_state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    init_server(
        options,
        app_state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await?;

    Ok(app_state)
}

fn init_health_worker(
    options: health::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), CoreError> {
    info!("Initializing health monitor...");

    let registry = app_state.registry.clone();
    let periphery = app_state.periphery.clone();

    let health_handle = tokio::spawn(async move {
        health::run(
            &options,
            registry.as_ref(),
            periphery.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_health_worker_handle(health_handle)
}

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), CoreError> {
    info!("Initializing HTTP server...");

    let listener = bind(&options.server).await?;
    let state = Arc::new(ServerState::new(
        app_state,
        shutdown_manager.connections_token(),
    ));
    let server_handle = serve(listener, state, async move {
        let _ = shutdown_rx.recv().await;
    });

    shutdown_manager.with_server_handle(server_handle)
}

// ================================= SHUTDOWN ====================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,

    /// Closes live WebSocket connections so the server can drain
    connections: CancellationToken,

    app_state: Option<Arc<AppState>>,
    health_worker_handle: Option<JoinHandle<()>>,
    server_handle: Option<JoinHandle<Result<(), CoreError>>>,
}

impl ShutdownManager {
    fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            connections: CancellationToken::new(),
            app_state: None,
            health_worker_handle: None,
            server_handle: None,
        }
    }

    fn connections_token(&self) -> CancellationToken {
        self.connections.clone()
    }

    fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), CoreError> {
        if self.app_state.is_some() {
            return Err(CoreError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    fn with_health_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), CoreError> {
        if self.health_worker_handle.is_some() {
            return Err(CoreError::ShutdownError(
                "health_worker_handle already set".to_string(),
            ));
        }
        self.health_worker_handle = Some(handle);
        Ok(())
    }

    fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), CoreError>>,
    ) -> Result<(), CoreError> {
        if self.server_handle.is_some() {
            return Err(CoreError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), CoreError> {
        let _ = self.shutdown_tx.send(());
        self.connections.cancel();

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                Err(CoreError::ShutdownError(format!(
                    "timed out after {:?}",
                    self.lifecycle_options.max_shutdown_delay
                )))
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), CoreError> {
        info!("Shutting down dockhand core...");

        // 1. Health monitor
        if let Some(handle) = self.health_worker_handle.take() {
            handle
                .await
                .map_err(|e| CoreError::ShutdownError(e.to_string()))?;
        }

        // 2. HTTP server, no new requests past this point
        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| CoreError::ShutdownError(e.to_string()))??;
        }

        // 3. In-flight actions
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
