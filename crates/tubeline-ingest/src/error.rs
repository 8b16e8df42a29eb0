//! Error taxonomy for a pipeline cycle
//!
//! Cycle-fatal errors ([`FetchError`], a top-level [`SchemaError`] during the
//! raw load, store and table failures) abort the cycle and surface through
//! [`PipelineError`]. Record-scoped errors ([`DecodeError`], a cast
//! [`SchemaError`] during the transform) are collected per record in
//! [`RecordError`] and never abort a batch. A [`RelocationError`] is reported
//! on an otherwise successful cycle.

use reqwest::StatusCode;
use thiserror::Error;
use tubeline_common::types::ArtifactKey;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// A single failed request against the feed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("feed responded with HTTP {0}")]
    Status(StatusCode),
}

/// The feed could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP client could not be built: {0}")]
    Client(#[source] reqwest::Error),

    #[error("fetch needs at least one attempt")]
    NoAttempts,

    #[error("feed {url} unavailable after {attempts} attempt(s): {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        last: AttemptError,
    },
}

/// A payload or field does not have the expected shape.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("payload must be a JSON array or object, found {found}")]
    TopLevel { found: &'static str },

    #[error("payload element {index} must be an object, found {found}")]
    Element { index: usize, found: &'static str },

    #[error("line status {entry} of record {identity_key}: {field} {value:?} is not an integer")]
    Cast {
        identity_key: i64,
        entry: usize,
        field: &'static str,
        value: String,
    },
}

/// The nested line-status structure of a raw record could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line statuses of record {identity_key} are not valid JSON: {source}")]
    Json {
        identity_key: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("line statuses of record {identity_key} must be an array of objects, found {found}")]
    Shape {
        identity_key: i64,
        found: &'static str,
    },
}

/// Why a raw record was left unpromoted in this cycle.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Artifact store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact {key} already exists")]
    AlreadyExists { key: ArtifactKey },

    #[error("artifact {key} not found")]
    NotFound { key: ArtifactKey },

    #[error("IO error on artifact {key}: {source}")]
    Io {
        key: ArtifactKey,
        #[source]
        source: std::io::Error,
    },

    #[error("object store error on artifact {key}: {message}")]
    ObjectStore { key: ArtifactKey, message: String },

    #[error(transparent)]
    Key(#[from] tubeline_common::TubelineError),
}

/// The staged payload was committed but could not be moved to the archive.
#[derive(Debug, Error)]
#[error("failed to move {from} to {to}: {source}")]
pub struct RelocationError {
    pub from: ArtifactKey,
    pub to: ArtifactKey,
    #[source]
    pub source: StoreError,
}

/// Durable table failures.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid table name '{0}': expected `table` or `schema.table`")]
    InvalidName(String),

    #[error("unknown promotion status '{0}'")]
    InvalidStatus(String),
}

/// Cycle-fatal errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<tubeline_common::TubelineError> for PipelineError {
    fn from(err: tubeline_common::TubelineError) -> Self {
        PipelineError::Store(StoreError::Key(err))
    }
}
