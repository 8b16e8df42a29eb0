//! Tubeline Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the Tubeline workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`TubelineError`] and the [`Result`] alias
//! - **Logging**: structured `tracing` setup shared by every binary
//! - **Types**: cycle timestamps and artifact keys used to name staged payloads
//!
//! # Example
//!
//! ```no_run
//! use tubeline_common::types::{ArtifactKey, CycleTimestamp};
//!
//! fn staging_key(location: &str) -> tubeline_common::Result<ArtifactKey> {
//!     let cycle = CycleTimestamp::now();
//!     ArtifactKey::join(location, &cycle.staging_name())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, TubelineError};
