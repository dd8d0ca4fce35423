//! Permission resolution

use tracing::{debug, info};

use crate::errors::CoreError;
use crate::models::permission::{permission_id, Permission, PermissionLevel};
use crate::models::update::ResourceTarget;
use crate::models::user::User;
use crate::models::Resource;
use crate::storage::collection::CollectionRef;

/// Computes effective permission levels from admin status, ownership and the
/// permission table
pub struct PermissionResolver {
    permissions: CollectionRef<Permission>,
}

impl PermissionResolver {
    pub fn new(permissions: CollectionRef<Permission>) -> Self {
        Self { permissions }
    }

    /// Effective level of `user` on `resource`
    pub async fn resolve(
        &self,
        user: &User,
        resource: &dyn Resource,
    ) -> Result<PermissionLevel, CoreError> {
        if user.admin {
            return Ok(PermissionLevel::Update);
        }
        if resource.owners().iter().any(|owner| owner == &user.id) {
            return Ok(PermissionLevel::Update);
        }
        let id = permission_id(&user.id, &resource.target());
        Ok(self
            .permissions
            .get(&id)
            .await?
            .map(|permission| permission.level)
            .unwrap_or_default())
    }

    /// Check `user` holds at least `level` on `resource`
    pub async fn require(
        &self,
        user: &User,
        resource: &dyn Resource,
        level: PermissionLevel,
    ) -> Result<PermissionLevel, CoreError> {
        let resolved = self.resolve(user, resource).await?;
        if resolved < level {
            debug!(
                "User {} holds {} on {}, {} required",
                user.id,
                resolved,
                resource.target(),
                level
            );
            return Err(CoreError::PermissionDenied(format!(
                "user {} needs {} permission on {} ({})",
                user.username,
                level,
                resource.target(),
                resource.name()
            )));
        }
        Ok(resolved)
    }

    /// Check `user` is an admin
    pub fn require_admin(&self, user: &User) -> Result<(), CoreError> {
        if user.admin {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied(format!(
                "user {} is not an admin",
                user.username
            )))
        }
    }

    /// Set the table entry of a user on a target. `None` removes it.
    pub async fn set(
        &self,
        user_id: &str,
        target: ResourceTarget,
        level: PermissionLevel,
    ) -> Result<Permission, CoreError> {
        let permission = Permission::new(user_id, target, level);
        if level == PermissionLevel::None {
            self.permissions.delete(&permission.id).await?;
        } else {
            self.permissions.upsert(permission.clone()).await?;
        }
        info!(
            "Set {} permission for user {} on {}",
            level, user_id, permission.target
        );
        Ok(permission)
    }

    /// Drop every table entry on a target
    pub async fn remove_for_target(&self, target: &ResourceTarget) -> Result<usize, CoreError> {
        let stale: Vec<Permission> = self
            .permissions
            .list()
            .await?
            .into_iter()
            .filter(|permission| &permission.target == target)
            .collect();
        for permission in &stale {
            self.permissions.delete(&permission.id).await?;
        }
        Ok(stale.len())
    }
}
