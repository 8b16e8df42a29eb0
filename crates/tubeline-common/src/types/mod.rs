//! Shared domain types
//!
//! A pipeline cycle is identified by the wall-clock instant it started. That
//! instant names the staged payload, so the same name can be used when the
//! payload is later moved to the archive location.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TubelineError};

/// Prefix of every staged payload name.
pub const STAGING_PREFIX: &str = "input_";

/// Extension of every staged payload name.
pub const STAGING_EXTENSION: &str = "json";

/// Timestamp layout used in staged payload names. Microseconds keep
/// back-to-back cycles from producing the same name.
const CYCLE_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// The instant a pipeline cycle started (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CycleTimestamp(DateTime<Utc>);

impl CycleTimestamp {
    /// Capture the current instant.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Name of the staged payload for this cycle, e.g.
    /// `input_20240118_093000_000123.json`.
    pub fn staging_name(&self) -> String {
        format!("{}{}.{}", STAGING_PREFIX, self, STAGING_EXTENSION)
    }
}

impl fmt::Display for CycleTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CYCLE_FORMAT))
    }
}

/// Path-like key addressing a blob in an artifact store.
///
/// Keys are `/`-separated. A key is never empty and never ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let trimmed = key.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(TubelineError::InvalidKey(format!("'{}' names no artifact", key)));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Build `<location>/<name>`.
    pub fn join(location: &str, name: &str) -> Result<Self> {
        if name.is_empty() || name.contains('/') {
            return Err(TubelineError::InvalidKey(format!(
                "'{}' is not a plain artifact name",
                name
            )));
        }

        let location = location.trim_end_matches('/');
        if location.is_empty() {
            Self::new(name)
        } else {
            Self::new(format!("{}/{}", location, name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment of the key.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Same artifact name under another location.
    pub fn relocated_to(&self, location: &str) -> Result<Self> {
        Self::join(location, self.file_name())
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
