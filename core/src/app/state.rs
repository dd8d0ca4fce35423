//! Application state management

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::actions::executor::ActionExecutor;
use crate::actions::state::ActionStates;
use crate::app::options::AppOptions;
use crate::authn::token::JwtAuthority;
use crate::errors::CoreError;
use crate::models::build::Build;
use crate::models::deployment::Deployment;
use crate::models::permission::Permission;
use crate::models::server::Server;
use crate::models::update::Update;
use crate::models::user::User;
use crate::periphery::client::PeripheryClient;
use crate::periphery::Periphery;
use crate::permissions::resolver::PermissionResolver;
use crate::resources::registry::ResourceRegistry;
use crate::storage::collection::{CollectionRef, MemoryCollection};
use crate::storage::journal::JournalCollection;
use crate::storage::json::JsonCollection;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::BootstrapAdmin;
use crate::updates::channel::UpdateChannel;
use crate::updates::log::UpdateLog;

/// The document collections backing the core
pub struct Collections {
    pub servers: CollectionRef<Server>,
    pub builds: CollectionRef<Build>,
    pub deployments: CollectionRef<Deployment>,
    pub updates: CollectionRef<Update>,
    pub permissions: CollectionRef<Permission>,
    pub users: CollectionRef<User>,
}

impl Collections {
    /// Collections that live only as long as the process
    pub fn in_memory() -> Self {
        Self {
            servers: MemoryCollection::shared("servers"),
            builds: MemoryCollection::shared("builds"),
            deployments: MemoryCollection::shared("deployments"),
            updates: MemoryCollection::shared("updates"),
            permissions: MemoryCollection::shared("permissions"),
            users: MemoryCollection::shared("users"),
        }
    }

    /// Collections persisted inside `data_dir`: configuration as JSON
    /// snapshots, the update history as an append-only journal
    pub async fn open(layout: &StorageLayout, data_dir: &Path) -> Result<Self, CoreError> {
        Ok(Self {
            servers: JsonCollection::shared("servers", layout.collection_file(data_dir, "servers"))
                .await?,
            builds: JsonCollection::shared("builds", layout.collection_file(data_dir, "builds"))
                .await?,
            deployments: JsonCollection::shared(
                "deployments",
                layout.collection_file(data_dir, "deployments"),
            )
            .await?,
            updates: JournalCollection::shared("updates", layout.journal_file(data_dir, "updates"))
                .await?,
            permissions: JsonCollection::shared(
                "permissions",
                layout.collection_file(data_dir, "permissions"),
            )
            .await?,
            users: JsonCollection::shared("users", layout.collection_file(data_dir, "users"))
                .await?,
        })
    }
}

/// Main application state
pub struct AppState {
    /// Servers, builds, deployments and users
    pub registry: Arc<ResourceRegistry>,

    /// Permission resolution
    pub permissions: Arc<PermissionResolver>,

    /// In-flight actions
    pub action_states: Arc<ActionStates>,

    /// Audit log of operations
    pub updates: Arc<UpdateLog>,

    /// Live update fan-out
    pub channel: Arc<UpdateChannel>,

    /// Periphery agents
    pub periphery: Arc<dyn Periphery>,

    /// Execute operations
    pub executor: Arc<ActionExecutor>,

    /// User tokens
    pub authority: Arc<JwtAuthority>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, CoreError> {
        info!("Initializing application state...");

        let collections = match &options.storage.data_dir {
            Some(data_dir) => {
                info!(
                    "Using collections in {}",
                    options.storage.layout.resolve(data_dir).display()
                );
                Collections::open(&options.storage.layout, data_dir).await?
            }
            None => {
                info!("Using in-memory collections");
                Collections::in_memory()
            }
        };

        let periphery: Arc<dyn Periphery> =
            Arc::new(PeripheryClient::new(options.periphery.clone())?);
        let authority = Arc::new(JwtAuthority::with_secret(
            options.auth.jwt_secret.clone(),
            options.auth.jwt_ttl_secs,
        ));

        let state =
            Self::assemble(collections, periphery, authority, options.updates_page_size).await?;

        if let Some(admin) = &options.bootstrap_admin {
            state.bootstrap_admin(admin).await?;
        }
        Ok(state)
    }

    /// Wire the components together and reconcile updates interrupted by a
    /// previous lifetime
    pub async fn assemble(
        collections: Collections,
        periphery: Arc<dyn Periphery>,
        authority: Arc<JwtAuthority>,
        updates_page_size: usize,
    ) -> Result<Self, CoreError> {
        let registry = Arc::new(ResourceRegistry::new(
            collections.servers,
            collections.builds,
            collections.deployments,
            collections.users,
        ));
        let permissions = Arc::new(PermissionResolver::new(collections.permissions));
        let channel = Arc::new(UpdateChannel::default());
        let updates = Arc::new(UpdateLog::new(
            collections.updates,
            channel.clone(),
            updates_page_size,
        ));
        updates.reconcile_interrupted().await?;

        let action_states = Arc::new(ActionStates::new());
        let executor = Arc::new(ActionExecutor::new(
            registry.clone(),
            permissions.clone(),
            action_states.clone(),
            updates.clone(),
            periphery.clone(),
        ));

        Ok(Self {
            registry,
            permissions,
            action_states,
            updates,
            channel,
            periphery,
            executor,
            authority,
        })
    }

    /// Make sure the configured admin exists
    pub async fn bootstrap_admin(&self, admin: &BootstrapAdmin) -> Result<User, CoreError> {
        let user = self
            .registry
            .ensure_user(User::new(&admin.id, &admin.username, true))
            .await?;
        if !user.admin {
            return Err(CoreError::ConfigError(format!(
                "bootstrap admin {} exists but is not an admin",
                user.id
            )));
        }
        Ok(user)
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        info!("Shutting down application state...");
        self.executor.shutdown().await;
        Ok(())
    }
}
