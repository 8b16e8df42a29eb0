//! Bronze to silver transform
//!
//! Every unpromoted raw record is decoded on its own. A record whose line
//! statuses fail to decode, or whose entries fail to cast, is skipped whole
//! and stays unpromoted so the next cycle picks it up again. An absent or
//! `null` severity is not a cast failure; the row carries no severity. The
//! rows of all remaining records are appended in one batch.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::bronze::{json_kind, text_value};
use crate::error::{DecodeError, RecordError, Result, SchemaError};
use crate::models::{CleansedStatusRecord, RawStatusRecord};
use crate::tables::{BronzeTable, SilverTable};

/// Entry keys inside `lineStatuses`.
pub const LINE_ID: &str = "lineId";
pub const STATUS_SEVERITY: &str = "statusSeverity";
pub const STATUS_SEVERITY_DESCRIPTION: &str = "statusSeverityDescription";
pub const REASON: &str = "reason";

/// One `lineStatuses` entry with every value in text form.
pub type StatusEntry = HashMap<String, Option<String>>;

/// Decode the stored `lineStatuses` text into its entries.
///
/// Absent or `null` line statuses decode to no entries.
pub fn decode_line_statuses(
    identity_key: i64,
    encoded: Option<&str>,
) -> std::result::Result<Vec<StatusEntry>, DecodeError> {
    let Some(encoded) = encoded else {
        return Ok(Vec::new());
    };

    let value: Value = serde_json::from_str(encoded)
        .map_err(|source| DecodeError::Json { identity_key, source })?;

    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => {
            return Err(DecodeError::Shape {
                identity_key,
                found: json_kind(&other),
            })
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(object) => Ok(object
                .iter()
                .map(|(key, value)| (key.clone(), text_value(Some(value))))
                .collect()),
            other => Err(DecodeError::Shape {
                identity_key,
                found: json_kind(&other),
            }),
        })
        .collect()
}

fn entry_text(entry: &StatusEntry, key: &str) -> Option<String> {
    entry.get(key).cloned().flatten()
}

/// Flatten one raw record into cleansed rows, one per status entry.
pub fn transform_record(
    raw: &RawStatusRecord,
    transformed_at: DateTime<Utc>,
) -> std::result::Result<Vec<CleansedStatusRecord>, RecordError> {
    let identity_key = raw.identity_key;
    let entries = decode_line_statuses(identity_key, raw.line.line_statuses.as_deref())?;

    let mut rows = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let line = entry_text(entry, LINE_ID)
            .filter(|line| !line.is_empty())
            .or_else(|| raw.line.id.clone());

        let status_severity = entry_text(entry, STATUS_SEVERITY)
            .map(|severity| {
                severity.trim().parse::<i32>().map_err(|_| SchemaError::Cast {
                    identity_key,
                    entry: index,
                    field: STATUS_SEVERITY,
                    value: severity.clone(),
                })
            })
            .transpose()?;

        rows.push(CleansedStatusRecord {
            identity_key,
            observation_timestamp: raw.created_timestamp,
            line,
            status_severity,
            status_severity_description: entry_text(entry, STATUS_SEVERITY_DESCRIPTION),
            disruption_reason: entry_text(entry, REASON),
            created_timestamp: transformed_at,
        });
    }

    Ok(rows)
}

/// A raw record left unpromoted by a transform run.
#[derive(Debug)]
pub struct SkippedRecord {
    pub identity_key: i64,
    pub error: RecordError,
}

/// Outcome of one transform run
#[derive(Debug, Default)]
pub struct TransformSummary {
    /// Unpromoted raw records read
    pub records_selected: usize,
    /// Cleansed rows appended
    pub rows_written: u64,
    /// Raw records whose rows were appended; ready to be marked promoted
    pub transformed_keys: Vec<i64>,
    pub skipped: Vec<SkippedRecord>,
}

impl TransformSummary {
    pub fn skipped_keys(&self) -> Vec<i64> {
        self.skipped.iter().map(|s| s.identity_key).collect()
    }
}

/// Bronze to silver transformer
pub struct Transformer {
    bronze: Arc<dyn BronzeTable>,
    silver: Arc<dyn SilverTable>,
}

impl Transformer {
    pub fn new(bronze: Arc<dyn BronzeTable>, silver: Arc<dyn SilverTable>) -> Self {
        Self { bronze, silver }
    }

    /// Transform every unpromoted raw record and append the rows to silver.
    ///
    /// Does not touch promotion state; the returned
    /// [`TransformSummary::transformed_keys`] are for the promotion tracker.
    #[instrument(skip(self))]
    pub async fn promote_unpromoted(&self) -> Result<TransformSummary> {
        let selected = self.bronze.unpromoted().await?;
        let transformed_at = Utc::now();

        let mut summary = TransformSummary {
            records_selected: selected.len(),
            ..TransformSummary::default()
        };
        let mut rows = Vec::new();

        for raw in &selected {
            match transform_record(raw, transformed_at) {
                Ok(record_rows) => {
                    rows.extend(record_rows);
                    summary.transformed_keys.push(raw.identity_key);
                }
                Err(error) => {
                    warn!(identity_key = raw.identity_key, error = %error, "Skipping raw record");
                    summary.skipped.push(SkippedRecord {
                        identity_key: raw.identity_key,
                        error,
                    });
                }
            }
        }

        summary.rows_written = self.silver.append(rows).await?;

        info!(
            selected = summary.records_selected,
            rows_written = summary.rows_written,
            transformed = summary.transformed_keys.len(),
            skipped = summary.skipped.len(),
            "Transform complete"
        );

        Ok(summary)
    }
}
