//! Cycle orchestration
//!
//! A cycle runs fetch, raw load, transform and promotion in order. Any
//! cycle-fatal error returns before the next stage starts.

use std::sync::Arc;
use tracing::{error, info, instrument};
use tubeline_common::types::{ArtifactKey, CycleTimestamp};

use crate::bronze::{ArchiveOutcome, RawWriter};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::fetcher::{FetchConfig, Fetcher};
use crate::models::CleansedStatusRecord;
use crate::promotion::PromotionTracker;
use crate::silver::{TransformSummary, Transformer};
use crate::storage::ArtifactStore;
use crate::tables::{BronzeTable, SilverTable};

/// Transform followed by promotion of the transformed keys.
#[derive(Debug)]
pub struct PromotionReport {
    pub transform: TransformSummary,
    /// Raw records flipped to promoted
    pub promoted_count: u64,
}

/// Outcome of a completed cycle
#[derive(Debug)]
pub struct CycleReport {
    pub cycle: CycleTimestamp,
    pub staging_key: ArtifactKey,
    /// Raw records committed by this cycle
    pub raw_records: usize,
    pub archive: ArchiveOutcome,
    pub promotion: PromotionReport,
}

impl CycleReport {
    /// Human-readable summary for the operator.
    pub fn completion_message(&self) -> String {
        let transform = &self.promotion.transform;
        let mut message = format!(
            "The pipeline cycle completed successfully: {} raw record(s) ingested, \
             {} cleansed row(s) written, {} record(s) promoted, {} record(s) skipped",
            self.raw_records,
            transform.rows_written,
            self.promotion.promoted_count,
            transform.skipped.len(),
        );

        if let ArchiveOutcome::RelocationFailed(failure) = &self.archive {
            message.push_str(&format!(
                ". Staged payload was not archived and needs manual reconciliation: {}",
                failure
            ));
        }

        message
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Fetcher,
    store: Arc<dyn ArtifactStore>,
    raw_writer: RawWriter,
    transformer: Transformer,
    tracker: PromotionTracker,
    silver: Arc<dyn SilverTable>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn ArtifactStore>,
        bronze: Arc<dyn BronzeTable>,
        silver: Arc<dyn SilverTable>,
    ) -> Result<Self> {
        config.validate()?;

        let fetcher = Fetcher::new(FetchConfig::from_pipeline(&config))?;
        let raw_writer = RawWriter::new(store.clone(), bronze.clone(), config.archive_dir.clone());
        let transformer = Transformer::new(bronze.clone(), silver.clone());
        let tracker = PromotionTracker::new(bronze);

        Ok(Self {
            config,
            fetcher,
            store,
            raw_writer,
            transformer,
            tracker,
            silver,
        })
    }

    /// Run one full cycle.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle = CycleTimestamp::now();
        info!(cycle = %cycle, "Starting pipeline cycle");

        let staging_key = self
            .fetcher
            .fetch_to_staging(self.store.as_ref(), &self.config.staging_dir, cycle)
            .await
            .inspect_err(|e| error!(error = %e, "Fetch failed; cycle aborted"))?;

        let raw = self
            .raw_writer
            .load_raw(&staging_key)
            .await
            .inspect_err(|e| error!(error = %e, "Raw load failed; cycle aborted"))?;

        let promotion = self
            .run_transform()
            .await
            .inspect_err(|e| error!(error = %e, "Transform failed; cycle aborted"))?;

        Ok(CycleReport {
            cycle,
            staging_key,
            raw_records: raw.committed.len(),
            archive: raw.archive,
            promotion,
        })
    }

    /// Transform every unpromoted raw record, then mark the transformed
    /// ones promoted. The flag update only starts after the silver append
    /// has committed.
    #[instrument(skip(self))]
    pub async fn run_transform(&self) -> Result<PromotionReport> {
        let transform = self.transformer.promote_unpromoted().await?;
        let promoted_count = self.tracker.mark_promoted(&transform.transformed_keys).await?;

        Ok(PromotionReport {
            transform,
            promoted_count,
        })
    }

    /// Latest cleansed rows, newest first.
    pub async fn preview(&self, limit: i64) -> Result<Vec<CleansedStatusRecord>> {
        Ok(self.silver.latest(limit).await?)
    }
}
