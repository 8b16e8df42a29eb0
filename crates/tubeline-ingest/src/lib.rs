//! Tubeline Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Polling batch pipeline for the TfL tube line status feed.
//!
//! A cycle moves one feed snapshot through three layers:
//!
//! - **Fetch**: bounded-retry HTTP GET, payload staged as `input_<cycle>.json`
//! - **Bronze**: payload parsed into raw text records, appended atomically,
//!   staged file moved to the archive
//! - **Silver**: unpromoted raw records unnested into one typed row per line
//!   status, then marked promoted
//!
//! Overlapping cycles are not serialized here. Schedule at most one
//! process at a time against the same tables.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tubeline_ingest::{
//!     config::PipelineConfig,
//!     pipeline::Pipeline,
//!     storage::LocalArtifactStore,
//!     tables::{MemoryBronzeTable, MemorySilverTable},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::new(
//!         PipelineConfig::from_env()?,
//!         Arc::new(LocalArtifactStore::new("/")),
//!         Arc::new(MemoryBronzeTable::new()),
//!         Arc::new(MemorySilverTable::new()),
//!     )?;
//!
//!     let report = pipeline.run_cycle().await?;
//!     println!("{}", report.completion_message());
//!     Ok(())
//! }
//! ```

pub mod bronze;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod promotion;
pub mod silver;
pub mod storage;
pub mod tables;

pub use error::{PipelineError, Result};
pub use pipeline::{CycleReport, Pipeline};
