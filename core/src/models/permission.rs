//! Permission models

use serde::{Deserialize, Serialize};

use crate::models::update::ResourceTarget;

/// Permission level, totally ordered `None < Read < Execute < Update`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PermissionLevel {
    #[default]
    None,
    Read,
    Execute,
    Update,
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Permission table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// `user:type:target`
    pub id: String,
    pub user_id: String,
    pub target: ResourceTarget,
    pub level: PermissionLevel,
}

impl Permission {
    pub fn new(user_id: &str, target: ResourceTarget, level: PermissionLevel) -> Self {
        Self {
            id: permission_id(user_id, &target),
            user_id: user_id.to_string(),
            target,
            level,
        }
    }
}

/// Storage key of the permission entry for a user on a target
pub fn permission_id(user_id: &str, target: &ResourceTarget) -> String {
    format!("{}:{}:{}", user_id, target.resource_type, target.id)
}
