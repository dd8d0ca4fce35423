//! Build models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::models::update::ResourceTarget;
use crate::models::version::Version;
use crate::models::Resource;
use crate::utils::{is_blank, now, to_docker_name};

/// A docker image built from a git repository on a builder server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: String,
    pub name: String,
    pub repo: String,
    pub branch: String,
    #[serde(default)]
    pub access_token: Option<String>,

    /// Server whose periphery agent clones and builds
    pub builder_server_id: String,

    /// Registry namespace; when set, built images are pushed
    #[serde(default)]
    pub docker_account: Option<String>,

    #[serde(default = "default_build_path")]
    pub build_path: String,

    #[serde(default = "default_dockerfile_path")]
    pub dockerfile_path: String,

    /// Last built version
    #[serde(default)]
    pub version: Version,

    #[serde(default)]
    pub last_built_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub owners: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_build_path() -> String {
    ".".to_string()
}

fn default_dockerfile_path() -> String {
    "Dockerfile".to_string()
}

impl Build {
    /// Image name derived from the build name
    pub fn image_name(&self) -> String {
        let name = to_docker_name(&self.name);
        match &self.docker_account {
            Some(account) if !is_blank(account) => format!("{}/{}", account.trim(), name),
            _ => name,
        }
    }

    /// Fully qualified image reference for a version
    pub fn image_tag(&self, version: &Version) -> String {
        format!("{}:{}", self.image_name(), version)
    }

    /// Copy safe to return from read operations
    pub fn redacted(&self) -> Self {
        Self {
            access_token: self.access_token.as_ref().map(|_| "#".repeat(8)),
            ..self.clone()
        }
    }

    /// Whether built images are pushed to a registry
    pub fn pushes(&self) -> bool {
        self.docker_account
            .as_deref()
            .map(|account| !is_blank(account))
            .unwrap_or(false)
    }
}

impl Resource for Build {
    fn target(&self) -> ResourceTarget {
        ResourceTarget::build(&self.id)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn owners(&self) -> &[String] {
        &self.owners
    }
}

/// Build configuration. On update, absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub builder_server_id: Option<String>,
    #[serde(default)]
    pub docker_account: Option<String>,
    #[serde(default)]
    pub build_path: Option<String>,
    #[serde(default)]
    pub dockerfile_path: Option<String>,
}

impl BuildConfig {
    /// Build a new build owned by `owner`
    pub fn into_build(self, id: String, owner: &str) -> Result<Build, CoreError> {
        let name = required(self.name, "build name")?;
        let repo = required(self.repo, "build repo")?;
        let builder_server_id = required(self.builder_server_id, "builder server")?;
        let ts = now();
        Ok(Build {
            id,
            name,
            repo,
            branch: self
                .branch
                .filter(|branch| !is_blank(branch))
                .unwrap_or_else(|| "main".to_string()),
            access_token: self.access_token.filter(|token| !is_blank(token)),
            builder_server_id,
            docker_account: self.docker_account.filter(|account| !is_blank(account)),
            build_path: self.build_path.unwrap_or_else(default_build_path),
            dockerfile_path: self.dockerfile_path.unwrap_or_else(default_dockerfile_path),
            version: Version::default(),
            last_built_at: None,
            owners: vec![owner.to_string()],
            created_at: ts,
            updated_at: ts,
        })
    }

    /// Apply the present fields to an existing build
    pub fn apply(self, build: &mut Build) -> Result<(), CoreError> {
        if self.name.is_some() {
            build.name = required(self.name, "build name")?;
        }
        if self.repo.is_some() {
            build.repo = required(self.repo, "build repo")?;
        }
        if self.branch.is_some() {
            build.branch = required(self.branch, "build branch")?;
        }
        if self.builder_server_id.is_some() {
            build.builder_server_id = required(self.builder_server_id, "builder server")?;
        }
        if let Some(token) = self.access_token {
            build.access_token = Some(token).filter(|token| !is_blank(token));
        }
        if let Some(account) = self.docker_account {
            build.docker_account = Some(account).filter(|account| !is_blank(account));
        }
        if let Some(build_path) = self.build_path {
            build.build_path = build_path;
        }
        if let Some(dockerfile_path) = self.dockerfile_path {
            build.dockerfile_path = dockerfile_path;
        }
        build.updated_at = now();
        Ok(())
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, CoreError> {
    value
        .filter(|value| !is_blank(value))
        .map(|value| value.trim().to_string())
        .ok_or_else(|| CoreError::ValidationError(format!("{} is required", field)))
}
