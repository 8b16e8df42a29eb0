//! In-process tables
//!
//! Each operation takes the table lock once, so an append is all-or-nothing
//! and a flag update is applied as one step, matching the PostgreSQL tables.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BronzeTable, SilverTable};
use crate::error::TableError;
use crate::models::{CleansedStatusRecord, NewRawRecord, PromotionStatus, RawStatusRecord};

#[derive(Debug, Default)]
struct BronzeState {
    rows: Vec<RawStatusRecord>,
    last_key: i64,
}

/// Bronze table held in memory
#[derive(Debug, Default)]
pub struct MemoryBronzeTable {
    state: RwLock<BronzeState>,
}

impl MemoryBronzeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, ordered by identity key.
    pub async fn rows(&self) -> Vec<RawStatusRecord> {
        self.state.read().await.rows.clone()
    }
}

#[async_trait]
impl BronzeTable for MemoryBronzeTable {
    async fn append(&self, records: Vec<NewRawRecord>) -> Result<Vec<RawStatusRecord>, TableError> {
        let mut state = self.state.write().await;

        let mut committed = Vec::with_capacity(records.len());
        for record in records {
            state.last_key += 1;
            committed.push(RawStatusRecord {
                identity_key: state.last_key,
                line: record.line,
                promotion_status: record.promotion_status,
                created_timestamp: record.created_timestamp,
            });
        }

        state.rows.extend(committed.iter().cloned());
        Ok(committed)
    }

    async fn unpromoted(&self) -> Result<Vec<RawStatusRecord>, TableError> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .iter()
            .filter(|row| !row.promotion_status.is_promoted())
            .cloned()
            .collect())
    }

    async fn mark_promoted(&self, identity_keys: &[i64]) -> Result<u64, TableError> {
        let mut state = self.state.write().await;

        let mut updated = 0;
        for row in state.rows.iter_mut() {
            if !row.promotion_status.is_promoted() && identity_keys.contains(&row.identity_key) {
                row.promotion_status = PromotionStatus::Promoted;
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn count(&self) -> Result<i64, TableError> {
        Ok(self.state.read().await.rows.len() as i64)
    }
}

/// Silver table held in memory
#[derive(Debug, Default)]
pub struct MemorySilverTable {
    rows: RwLock<Vec<CleansedStatusRecord>>,
}

impl MemorySilverTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row in write order.
    pub async fn rows(&self) -> Vec<CleansedStatusRecord> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl SilverTable for MemorySilverTable {
    async fn append(&self, rows: Vec<CleansedStatusRecord>) -> Result<u64, TableError> {
        let written = rows.len() as u64;
        self.rows.write().await.extend(rows);
        Ok(written)
    }

    async fn latest(&self, limit: i64) -> Result<Vec<CleansedStatusRecord>, TableError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let rows = self.rows.read().await;
        Ok(rows.iter().rev().take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<i64, TableError> {
        Ok(self.rows.read().await.len() as i64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::FeedLine;
    use chrono::Utc;

    fn new_record(id: &str) -> NewRawRecord {
        NewRawRecord::unpromoted(
            FeedLine {
                id: Some(id.to_string()),
                ..FeedLine::default()
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_keys() {
        let table = MemoryBronzeTable::new();

        let first = table.append(vec![new_record("bakerloo"), new_record("central")]).await.unwrap();
        let second = table.append(vec![new_record("district")]).await.unwrap();

        let keys: Vec<i64> = first.iter().chain(second.iter()).map(|r| r.identity_key).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(table.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_mark_promoted_is_scoped_and_idempotent() {
        let table = MemoryBronzeTable::new();
        table
            .append(vec![new_record("a"), new_record("b"), new_record("c")])
            .await
            .unwrap();

        assert_eq!(table.mark_promoted(&[1, 3, 99]).await.unwrap(), 2);
        assert_eq!(table.mark_promoted(&[1, 3]).await.unwrap(), 0);

        let pending: Vec<i64> = table.unpromoted().await.unwrap().iter().map(|r| r.identity_key).collect();
        assert_eq!(pending, vec![2]);
    }

    #[tokio::test]
    async fn test_silver_latest_returns_newest_first() {
        let table = MemorySilverTable::new();
        let now = Utc::now();
        let rows: Vec<CleansedStatusRecord> = (1..=3)
            .map(|key| CleansedStatusRecord {
                identity_key: key,
                observation_timestamp: now,
                line: Some(format!("line-{key}")),
                status_severity: Some(10),
                status_severity_description: Some("Good Service".to_string()),
                disruption_reason: None,
                created_timestamp: now,
            })
            .collect();

        assert_eq!(table.append(rows).await.unwrap(), 3);

        let latest: Vec<i64> = table.latest(2).await.unwrap().iter().map(|r| r.identity_key).collect();
        assert_eq!(latest, vec![3, 2]);
        assert!(table.latest(-1).await.unwrap().is_empty());
    }
}
