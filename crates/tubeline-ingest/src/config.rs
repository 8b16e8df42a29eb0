//! Pipeline configuration
//!
//! Values come from the environment (after loading a `.env` file, if any)
//! and fall back to the defaults below.
//! The CLI can override any of them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PipelineError;
use crate::tables::TableName;

// ============================================================================
// Defaults
// ============================================================================

/// Tube line status endpoint.
pub const DEFAULT_FEED_URL: &str = "https://api.tfl.gov.uk/line/mode/tube/status";

pub const DEFAULT_STAGING_DIR: &str = "/FileStore/TFL/staging";

pub const DEFAULT_ARCHIVE_DIR: &str = "/FileStore/TFL/archive";

pub const DEFAULT_BRONZE_TABLE: &str = "bronze.tubestatus";

pub const DEFAULT_SILVER_TABLE: &str = "silver.tubestatus";

/// Number of fetch attempts per cycle.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Fixed delay between fetch attempts.
pub const DEFAULT_FETCH_BACKOFF_SECS: u64 = 10;

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Cleansed rows shown after a cycle.
pub const DEFAULT_PREVIEW_ROWS: i64 = 5;

/// Where staged and archived payloads live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local or mounted filesystem
    #[default]
    Local,
    /// S3-compatible object storage
    S3,
}

impl std::str::FromStr for StorageBackend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "fs" => Ok(StorageBackend::Local),
            "s3" => Ok(StorageBackend::S3),
            other => Err(PipelineError::Config(format!(
                "unknown storage backend '{}' (expected local or s3)",
                other
            ))),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub feed_url: String,
    pub staging_dir: String,
    pub archive_dir: String,
    pub bronze_table: String,
    pub silver_table: String,
    pub fetch_attempts: u32,
    pub fetch_backoff_secs: u64,
    pub fetch_timeout_secs: u64,
    pub storage: StorageBackend,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            staging_dir: DEFAULT_STAGING_DIR.to_string(),
            archive_dir: DEFAULT_ARCHIVE_DIR.to_string(),
            bronze_table: DEFAULT_BRONZE_TABLE.to_string(),
            silver_table: DEFAULT_SILVER_TABLE.to_string(),
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            fetch_backoff_secs: DEFAULT_FETCH_BACKOFF_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            storage: StorageBackend::Local,
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>, PipelineError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PipelineError::Config(format!("{} must be a number, got '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

impl PipelineConfig {
    /// Load configuration from environment and defaults
    ///
    /// - `TUBELINE_FEED_URL`
    /// - `TUBELINE_STAGING_DIR`, `TUBELINE_ARCHIVE_DIR`
    /// - `TUBELINE_BRONZE_TABLE`, `TUBELINE_SILVER_TABLE`
    /// - `TUBELINE_FETCH_ATTEMPTS`, `TUBELINE_FETCH_BACKOFF_SECS`, `TUBELINE_FETCH_TIMEOUT_SECS`
    /// - `TUBELINE_STORAGE` (local, s3)
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let text = |name: &str, default: String| std::env::var(name).unwrap_or(default);

        let config = Self {
            feed_url: text("TUBELINE_FEED_URL", defaults.feed_url),
            staging_dir: text("TUBELINE_STAGING_DIR", defaults.staging_dir),
            archive_dir: text("TUBELINE_ARCHIVE_DIR", defaults.archive_dir),
            bronze_table: text("TUBELINE_BRONZE_TABLE", defaults.bronze_table),
            silver_table: text("TUBELINE_SILVER_TABLE", defaults.silver_table),
            fetch_attempts: env_number("TUBELINE_FETCH_ATTEMPTS")?
                .unwrap_or(defaults.fetch_attempts),
            fetch_backoff_secs: env_number("TUBELINE_FETCH_BACKOFF_SECS")?
                .unwrap_or(defaults.fetch_backoff_secs),
            fetch_timeout_secs: env_number("TUBELINE_FETCH_TIMEOUT_SECS")?
                .unwrap_or(defaults.fetch_timeout_secs),
            storage: match std::env::var("TUBELINE_STORAGE") {
                Ok(raw) => raw.parse()?,
                Err(_) => defaults.storage,
            },
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), PipelineError> {
        let required = [
            ("feed URL", &self.feed_url),
            ("staging location", &self.staging_dir),
            ("archive location", &self.archive_dir),
            ("bronze table", &self.bronze_table),
            ("silver table", &self.silver_table),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(PipelineError::Config(format!("{} cannot be empty", name)));
            }
        }

        if self.fetch_attempts == 0 {
            return Err(PipelineError::Config(
                "fetch attempts must be greater than 0".to_string(),
            ));
        }

        if self.fetch_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "fetch timeout must be greater than 0".to_string(),
            ));
        }

        if self.staging_dir.trim_end_matches('/') == self.archive_dir.trim_end_matches('/') {
            return Err(PipelineError::Config(
                "staging and archive locations must differ".to_string(),
            ));
        }

        TableName::parse(&self.bronze_table)?;
        TableName::parse(&self.silver_table)?;

        Ok(())
    }

    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_secs(self.fetch_backoff_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
