//! Promotion tracker
//!
//! Marks raw records promoted once their cleansed rows are committed. Only
//! the keys handed over by the transformer are touched.

use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::Result;
use crate::tables::BronzeTable;

pub struct PromotionTracker {
    bronze: Arc<dyn BronzeTable>,
}

impl PromotionTracker {
    pub fn new(bronze: Arc<dyn BronzeTable>) -> Self {
        Self { bronze }
    }

    /// Flip the given records to promoted. Already promoted keys are left
    /// alone, so calling this twice with the same keys is a no-op.
    #[instrument(skip(self, identity_keys), fields(keys = identity_keys.len()))]
    pub async fn mark_promoted(&self, identity_keys: &[i64]) -> Result<u64> {
        if identity_keys.is_empty() {
            return Ok(0);
        }

        let updated = self.bronze.mark_promoted(identity_keys).await?;
        info!(updated, "Raw records promoted");
        Ok(updated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{FeedLine, NewRawRecord};
    use crate::tables::MemoryBronzeTable;
    use chrono::Utc;

    #[tokio::test]
    async fn test_only_given_keys_are_promoted() {
        let bronze = Arc::new(MemoryBronzeTable::new());
        let records = (0..3)
            .map(|_| NewRawRecord::unpromoted(FeedLine::default(), Utc::now()))
            .collect();
        bronze.append(records).await.unwrap();

        let tracker = PromotionTracker::new(bronze.clone());
        assert_eq!(tracker.mark_promoted(&[2]).await.unwrap(), 1);
        assert_eq!(tracker.mark_promoted(&[2]).await.unwrap(), 0);
        assert_eq!(tracker.mark_promoted(&[]).await.unwrap(), 0);

        let pending: Vec<i64> = bronze
            .unpromoted()
            .await
            .unwrap()
            .iter()
            .map(|r| r.identity_key)
            .collect();
        assert_eq!(pending, vec![1, 3]);
    }
}
