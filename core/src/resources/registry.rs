//! Resource registry
//!
//! Typed access to the server, build, deployment and user collections, plus
//! the referential rules between them.

use tracing::info;

use crate::errors::CoreError;
use crate::models::build::Build;
use crate::models::deployment::Deployment;
use crate::models::server::{Server, ServerStatus};
use crate::models::update::{ResourceTarget, ResourceType};
use crate::models::user::User;
use crate::models::version::Version;
use crate::models::Resource;
use crate::storage::collection::CollectionRef;
use crate::utils::now;

/// Any resource that can be the target of an update
#[derive(Debug, Clone)]
pub enum AnyResource {
    Server(Server),
    Build(Build),
    Deployment(Deployment),
}

impl AnyResource {
    fn inner(&self) -> &dyn Resource {
        match self {
            AnyResource::Server(server) => server,
            AnyResource::Build(build) => build,
            AnyResource::Deployment(deployment) => deployment,
        }
    }
}

impl Resource for AnyResource {
    fn target(&self) -> ResourceTarget {
        self.inner().target()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn owners(&self) -> &[String] {
        self.inner().owners()
    }
}

/// Store of servers, builds, deployments and users
pub struct ResourceRegistry {
    pub servers: CollectionRef<Server>,
    pub builds: CollectionRef<Build>,
    pub deployments: CollectionRef<Deployment>,
    pub users: CollectionRef<User>,
}

impl ResourceRegistry {
    pub fn new(
        servers: CollectionRef<Server>,
        builds: CollectionRef<Build>,
        deployments: CollectionRef<Deployment>,
        users: CollectionRef<User>,
    ) -> Self {
        Self {
            servers,
            builds,
            deployments,
            users,
        }
    }

    pub async fn get_server(&self, id: &str) -> Result<Server, CoreError> {
        self.servers
            .get(id)
            .await?
            .ok_or_else(|| CoreError::ResourceNotFound(format!("server {}", id)))
    }

    pub async fn get_build(&self, id: &str) -> Result<Build, CoreError> {
        self.builds
            .get(id)
            .await?
            .ok_or_else(|| CoreError::ResourceNotFound(format!("build {}", id)))
    }

    pub async fn get_deployment(&self, id: &str) -> Result<Deployment, CoreError> {
        self.deployments
            .get(id)
            .await?
            .ok_or_else(|| CoreError::ResourceNotFound(format!("deployment {}", id)))
    }

    pub async fn get_user(&self, id: &str) -> Result<User, CoreError> {
        self.users
            .get(id)
            .await?
            .ok_or_else(|| CoreError::ResourceNotFound(format!("user {}", id)))
    }

    /// Load the resource a target points at
    pub async fn resource(&self, target: &ResourceTarget) -> Result<AnyResource, CoreError> {
        Ok(match target.resource_type {
            ResourceType::Server => AnyResource::Server(self.get_server(&target.id).await?),
            ResourceType::Build => AnyResource::Build(self.get_build(&target.id).await?),
            ResourceType::Deployment => {
                AnyResource::Deployment(self.get_deployment(&target.id).await?)
            }
            ResourceType::User => {
                return Err(CoreError::ValidationError(format!(
                    "user {} is not a resource",
                    target.id
                )))
            }
        })
    }

    /// Every server, build and deployment
    pub async fn all_resources(&self) -> Result<Vec<AnyResource>, CoreError> {
        let mut resources: Vec<AnyResource> = Vec::new();
        resources.extend(self.servers.list().await?.into_iter().map(AnyResource::Server));
        resources.extend(self.builds.list().await?.into_iter().map(AnyResource::Build));
        resources.extend(
            self.deployments
                .list()
                .await?
                .into_iter()
                .map(AnyResource::Deployment),
        );
        Ok(resources)
    }

    /// Fail when a server is still referenced
    pub async fn ensure_server_unused(&self, server_id: &str) -> Result<(), CoreError> {
        if let Some(deployment) = self
            .deployments
            .list()
            .await?
            .into_iter()
            .find(|deployment| deployment.server_id == server_id)
        {
            return Err(CoreError::ValidationError(format!(
                "server {} is used by deployment {}",
                server_id, deployment.name
            )));
        }
        if let Some(build) = self
            .builds
            .list()
            .await?
            .into_iter()
            .find(|build| build.builder_server_id == server_id)
        {
            return Err(CoreError::ValidationError(format!(
                "server {} is the builder of build {}",
                server_id, build.name
            )));
        }
        Ok(())
    }

    /// Fail when a build is still the source of a deployment
    pub async fn ensure_build_unused(&self, build_id: &str) -> Result<(), CoreError> {
        if let Some(deployment) = self
            .deployments
            .list()
            .await?
            .into_iter()
            .find(|deployment| deployment.build_id.as_deref() == Some(build_id))
        {
            return Err(CoreError::ValidationError(format!(
                "build {} is deployed by deployment {}",
                build_id, deployment.name
            )));
        }
        Ok(())
    }

    /// Store a health check outcome. Returns `true` when the status changed.
    pub async fn set_server_status(
        &self,
        server_id: &str,
        status: ServerStatus,
    ) -> Result<bool, CoreError> {
        if self.get_server(server_id).await?.status == status {
            return Ok(false);
        }
        let mut previous = status;
        let server = self
            .servers
            .update(
                server_id,
                Box::new(|server: &mut Server| {
                    previous = server.status;
                    server.status = status;
                    Ok(())
                }),
            )
            .await?;
        if previous == status {
            return Ok(false);
        }
        info!("Server {} is now {:?}", server.name, status);
        Ok(true)
    }

    /// Store the outcome of a successful build. The version never moves
    /// backwards.
    pub async fn record_build_success(
        &self,
        build_id: &str,
        version: Version,
    ) -> Result<Build, CoreError> {
        self.builds
            .update(
                build_id,
                Box::new(move |build: &mut Build| {
                    if version > build.version {
                        build.version = version;
                    }
                    build.last_built_at = Some(now());
                    Ok(())
                }),
            )
            .await
    }

    /// Create the user if it does not exist yet
    pub async fn ensure_user(&self, user: User) -> Result<User, CoreError> {
        if let Some(existing) = self.users.get(&user.id).await? {
            return Ok(existing);
        }
        info!("Creating user {} ({})", user.username, user.id);
        self.users.insert(user.clone()).await?;
        Ok(user)
    }
}
