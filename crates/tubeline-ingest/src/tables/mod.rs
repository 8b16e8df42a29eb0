//! Durable table collaborators
//!
//! The pipeline only needs three things from storage: an atomic multi-row
//! append that assigns surrogate keys, a filtered read of unpromoted rows,
//! and a conditional flag update. [`BronzeTable`] and [`SilverTable`] capture
//! exactly that; PostgreSQL provides it in production and the in-memory
//! tables provide it in tests and throwaway runs.

use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::error::TableError;
use crate::models::{CleansedStatusRecord, NewRawRecord, RawStatusRecord};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryBronzeTable, MemorySilverTable};
pub use postgres::{PgBronzeTable, PgSilverTable};

/// Raw (bronze) table
#[async_trait]
pub trait BronzeTable: Send + Sync {
    /// Append every record or none of them. Returns the committed rows with
    /// their assigned identity keys, in input order.
    async fn append(&self, records: Vec<NewRawRecord>) -> Result<Vec<RawStatusRecord>, TableError>;

    /// All rows still unpromoted, ordered by identity key.
    async fn unpromoted(&self) -> Result<Vec<RawStatusRecord>, TableError>;

    /// Flip `unpromoted -> promoted` for the given keys. Keys that are already
    /// promoted or unknown are ignored. Returns the number of rows changed.
    async fn mark_promoted(&self, identity_keys: &[i64]) -> Result<u64, TableError>;

    async fn count(&self) -> Result<i64, TableError>;
}

/// Cleansed (silver) table
#[async_trait]
pub trait SilverTable: Send + Sync {
    /// Append every row or none of them. Returns the number of rows written.
    async fn append(&self, rows: Vec<CleansedStatusRecord>) -> Result<u64, TableError>;

    /// Most recently written rows first.
    async fn latest(&self, limit: i64) -> Result<Vec<CleansedStatusRecord>, TableError>;

    async fn count(&self) -> Result<i64, TableError>;
}

#[allow(clippy::unwrap_used)]
static TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap()
});

/// A `table` or `schema.table` identifier that is safe to splice into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn parse(name: &str) -> Result<Self, TableError> {
        let name = name.trim();
        if TABLE_NAME.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(TableError::InvalidName(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
