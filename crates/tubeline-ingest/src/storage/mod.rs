//! Staging and archive locations
//!
//! Payloads are staged under `<staging>/input_<cycle>.json` and moved to
//! `<archive>/input_<cycle>.json` once the raw load has committed.

use async_trait::async_trait;
use tubeline_common::types::ArtifactKey;

use crate::error::StoreError;

pub mod config;
pub mod local;
pub mod s3;

pub use config::S3Config;
pub use local::LocalArtifactStore;
pub use s3::S3ArtifactStore;

/// Blob store addressed by path-like keys
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Create a new artifact. An existing artifact under `key` is an
    /// [`StoreError::AlreadyExists`] error and is left untouched.
    async fn write(&self, key: &ArtifactKey, data: Vec<u8>) -> Result<(), StoreError>;

    async fn read(&self, key: &ArtifactKey) -> Result<Vec<u8>, StoreError>;

    /// Move an artifact. After success only `to` exists.
    async fn relocate(&self, from: &ArtifactKey, to: &ArtifactKey) -> Result<(), StoreError>;

    async fn exists(&self, key: &ArtifactKey) -> Result<bool, StoreError>;

    /// Keys directly under `location`, sorted.
    async fn list(&self, location: &str) -> Result<Vec<ArtifactKey>, StoreError>;
}
