//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::utils::{is_blank, now};

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn new(id: &str, username: &str, admin: bool) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            admin,
            enabled: true,
            created_at: now(),
        }
    }
}

/// User configuration. On update, absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub admin: Option<bool>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl UserConfig {
    /// Build a new user
    pub fn into_user(self, id: String) -> Result<User, CoreError> {
        let username = self
            .username
            .filter(|username| !is_blank(username))
            .ok_or_else(|| CoreError::ValidationError("username is required".to_string()))?;
        let mut user = User::new(&id, username.trim(), self.admin.unwrap_or(false));
        user.enabled = self.enabled.unwrap_or(true);
        Ok(user)
    }

    /// Apply the present fields to an existing user
    pub fn apply(self, user: &mut User) -> Result<(), CoreError> {
        if let Some(username) = self.username {
            if is_blank(&username) {
                return Err(CoreError::ValidationError(
                    "username must not be empty".to_string(),
                ));
            }
            user.username = username.trim().to_string();
        }
        if let Some(admin) = self.admin {
            user.admin = admin;
        }
        if let Some(enabled) = self.enabled {
            user.enabled = enabled;
        }
        Ok(())
    }

    /// Whether applying this config would take admin access away from `user`
    pub fn revokes_admin(&self, user: &User) -> bool {
        user.admin && (self.admin == Some(false) || self.enabled == Some(false))
    }
}
