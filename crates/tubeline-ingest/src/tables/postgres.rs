//! PostgreSQL tables
//!
//! Appends run inside one transaction, chunked so a large batch stays under
//! the bind-parameter limit. The identity key comes from a
//! `GENERATED BY DEFAULT AS IDENTITY` column. Silver rows carry their own
//! `row_id` identity, which orders them in write order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use super::{BronzeTable, SilverTable, TableName};
use crate::error::TableError;
use crate::models::{
    CleansedStatusRecord, FeedLine, NewRawRecord, PromotionStatus, RawStatusRecord,
};

/// Rows per INSERT statement.
pub const INSERT_CHUNK_SIZE: usize = 1000;

const BRONZE_COLUMNS: &str = "record_type, created, crowding, disruptions, id, line_statuses, \
     mode_name, modified, name, route_sections, service_types, promotion_status, created_timestamp";

const SILVER_COLUMNS: &str = "identity_key, observation_timestamp, line, status_severity, \
     status_severity_description, disruption_reason, created_timestamp";

#[derive(Debug, sqlx::FromRow)]
struct RawRow {
    identity_key: i64,
    record_type: Option<String>,
    created: Option<String>,
    crowding: Option<String>,
    disruptions: Option<String>,
    id: Option<String>,
    line_statuses: Option<String>,
    mode_name: Option<String>,
    modified: Option<String>,
    name: Option<String>,
    route_sections: Option<String>,
    service_types: Option<String>,
    promotion_status: String,
    created_timestamp: DateTime<Utc>,
}

impl TryFrom<RawRow> for RawStatusRecord {
    type Error = TableError;

    fn try_from(row: RawRow) -> Result<Self, Self::Error> {
        Ok(Self {
            identity_key: row.identity_key,
            line: FeedLine {
                record_type: row.record_type,
                created: row.created,
                crowding: row.crowding,
                disruptions: row.disruptions,
                id: row.id,
                line_statuses: row.line_statuses,
                mode_name: row.mode_name,
                modified: row.modified,
                name: row.name,
                route_sections: row.route_sections,
                service_types: row.service_types,
            },
            promotion_status: row.promotion_status.parse()?,
            created_timestamp: row.created_timestamp,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CleansedRow {
    identity_key: i64,
    observation_timestamp: DateTime<Utc>,
    line: Option<String>,
    status_severity: Option<i32>,
    status_severity_description: Option<String>,
    disruption_reason: Option<String>,
    created_timestamp: DateTime<Utc>,
}

impl From<CleansedRow> for CleansedStatusRecord {
    fn from(row: CleansedRow) -> Self {
        Self {
            identity_key: row.identity_key,
            observation_timestamp: row.observation_timestamp,
            line: row.line,
            status_severity: row.status_severity,
            status_severity_description: row.status_severity_description,
            disruption_reason: row.disruption_reason,
            created_timestamp: row.created_timestamp,
        }
    }
}

/// Bronze table in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgBronzeTable {
    pool: PgPool,
    table: TableName,
}

impl PgBronzeTable {
    pub fn new(pool: PgPool, table: TableName) -> Self {
        Self { pool, table }
    }
}

#[async_trait]
impl BronzeTable for PgBronzeTable {
    #[instrument(skip(self, records), fields(table = %self.table, rows = records.len()))]
    async fn append(&self, records: Vec<NewRawRecord>) -> Result<Vec<RawStatusRecord>, TableError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut committed = Vec::with_capacity(records.len());

        for chunk in records.chunks(INSERT_CHUNK_SIZE) {
            let mut query: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({}) ", self.table, BRONZE_COLUMNS));

            query.push_values(chunk, |mut row, record| {
                let line = &record.line;
                row.push_bind(line.record_type.clone())
                    .push_bind(line.created.clone())
                    .push_bind(line.crowding.clone())
                    .push_bind(line.disruptions.clone())
                    .push_bind(line.id.clone())
                    .push_bind(line.line_statuses.clone())
                    .push_bind(line.mode_name.clone())
                    .push_bind(line.modified.clone())
                    .push_bind(line.name.clone())
                    .push_bind(line.route_sections.clone())
                    .push_bind(line.service_types.clone())
                    .push_bind(record.promotion_status.as_str())
                    .push_bind(record.created_timestamp);
            });
            query.push(format!(" RETURNING identity_key, {}", BRONZE_COLUMNS));

            let rows: Vec<RawRow> = query.build_query_as().fetch_all(&mut *tx).await?;
            for row in rows {
                committed.push(RawStatusRecord::try_from(row)?);
            }
        }

        tx.commit().await?;

        debug!(committed = committed.len(), "Bronze append committed");
        Ok(committed)
    }

    async fn unpromoted(&self) -> Result<Vec<RawStatusRecord>, TableError> {
        let rows: Vec<RawRow> = sqlx::query_as(&format!(
            "SELECT identity_key, {} FROM {} WHERE promotion_status = $1 ORDER BY identity_key",
            BRONZE_COLUMNS, self.table
        ))
        .bind(PromotionStatus::Unpromoted.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RawStatusRecord::try_from).collect()
    }

    #[instrument(skip(self, identity_keys), fields(table = %self.table, keys = identity_keys.len()))]
    async fn mark_promoted(&self, identity_keys: &[i64]) -> Result<u64, TableError> {
        if identity_keys.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(&format!(
            "UPDATE {} SET promotion_status = $1 \
             WHERE promotion_status = $2 AND identity_key = ANY($3)",
            self.table
        ))
        .bind(PromotionStatus::Promoted.as_str())
        .bind(PromotionStatus::Unpromoted.as_str())
        .bind(identity_keys.to_vec())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<i64, TableError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Silver table in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgSilverTable {
    pool: PgPool,
    table: TableName,
}

impl PgSilverTable {
    pub fn new(pool: PgPool, table: TableName) -> Self {
        Self { pool, table }
    }
}

#[async_trait]
impl SilverTable for PgSilverTable {
    #[instrument(skip(self, rows), fields(table = %self.table, rows = rows.len()))]
    async fn append(&self, rows: Vec<CleansedStatusRecord>) -> Result<u64, TableError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
            let mut query: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({}) ", self.table, SILVER_COLUMNS));

            query.push_values(chunk, |mut row, record| {
                row.push_bind(record.identity_key)
                    .push_bind(record.observation_timestamp)
                    .push_bind(record.line.clone())
                    .push_bind(record.status_severity)
                    .push_bind(record.status_severity_description.clone())
                    .push_bind(record.disruption_reason.clone())
                    .push_bind(record.created_timestamp);
            });

            written += query.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn latest(&self, limit: i64) -> Result<Vec<CleansedStatusRecord>, TableError> {
        let rows: Vec<CleansedRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} ORDER BY row_id DESC LIMIT $1",
            SILVER_COLUMNS, self.table
        ))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CleansedStatusRecord::from).collect())
    }

    async fn count(&self) -> Result<i64, TableError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
