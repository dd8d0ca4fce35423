//! Build version

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Semantic build version. Each successful build bumps `patch`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The version a successful build advances to
    pub fn increment(&self) -> Self {
        Self {
            patch: self.patch + 1,
            ..*self
        }
    }

    pub fn is_none(&self) -> bool {
        *self == Version::default()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| format!("Invalid version: {}", s))?;
        match parts.as_slice() {
            [major, minor, patch] => Ok(Version::new(*major, *minor, *patch)),
            _ => Err(format!("Invalid version: {}", s)),
        }
    }
}
