//! Raw (bronze) loader
//!
//! Parses a staged payload into [`FeedLine`]s, appends them to the bronze
//! table in one atomic batch and then moves the payload to the archive.

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, instrument};
use tubeline_common::types::ArtifactKey;

use crate::error::{RelocationError, Result, SchemaError};
use crate::models::{FeedLine, NewRawRecord, RawStatusRecord};
use crate::storage::ArtifactStore;
use crate::tables::BronzeTable;

/// Where the staged payload ended up after a committed load.
#[derive(Debug)]
pub enum ArchiveOutcome {
    Archived(ArtifactKey),
    /// The raw rows are committed; the payload is still in staging.
    RelocationFailed(RelocationError),
}

/// Result of one raw load
#[derive(Debug)]
pub struct RawLoadReport {
    pub committed: Vec<RawStatusRecord>,
    pub archive: ArchiveOutcome,
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Text form of a feed value. Strings are kept as-is, structured values
/// keep their JSON encoding, and null means absent.
pub(crate) fn text_value(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn feed_line(object: &Map<String, Value>) -> FeedLine {
    let field = |name: &str| text_value(object.get(name));

    FeedLine {
        record_type: field("$type").or_else(|| field("type")),
        created: field("created"),
        crowding: field("crowding"),
        disruptions: field("disruptions"),
        id: field("id"),
        line_statuses: field("lineStatuses"),
        mode_name: field("modeName"),
        modified: field("modified"),
        name: field("name"),
        route_sections: field("routeSections"),
        service_types: field("serviceTypes"),
    }
}

/// Parse a feed payload: a JSON array of line objects, or a single line
/// object. Unknown fields are ignored and missing ones become `None`.
pub fn parse_payload(payload: &[u8]) -> std::result::Result<Vec<FeedLine>, SchemaError> {
    let value: Value = serde_json::from_slice(payload).map_err(SchemaError::InvalidJson)?;

    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(object) => Ok(feed_line(object)),
                other => Err(SchemaError::Element {
                    index,
                    found: json_kind(other),
                }),
            })
            .collect(),
        Value::Object(object) => Ok(vec![feed_line(&object)]),
        other => Err(SchemaError::TopLevel {
            found: json_kind(&other),
        }),
    }
}

/// Bronze loader
pub struct RawWriter {
    store: Arc<dyn ArtifactStore>,
    table: Arc<dyn BronzeTable>,
    archive_dir: String,
}

impl RawWriter {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        table: Arc<dyn BronzeTable>,
        archive_dir: impl Into<String>,
    ) -> Self {
        Self {
            store,
            table,
            archive_dir: archive_dir.into(),
        }
    }

    /// Load a staged payload into the bronze table and archive it.
    ///
    /// A payload that fails to parse aborts before anything is appended and
    /// stays in staging. A failed move to the archive is reported in the
    /// returned [`ArchiveOutcome`], never as an error.
    #[instrument(skip(self), fields(artifact = %staging))]
    pub async fn load_raw(&self, staging: &ArtifactKey) -> Result<RawLoadReport> {
        let payload = self.store.read(staging).await?;
        let lines = parse_payload(&payload)?;

        let created_timestamp = Utc::now();
        let records = lines
            .into_iter()
            .map(|line| NewRawRecord::unpromoted(line, created_timestamp))
            .collect();

        let committed = self.table.append(records).await?;
        info!(records = committed.len(), "Raw records committed");

        let archive_key = staging.relocated_to(&self.archive_dir)?;
        let archive = match self.store.relocate(staging, &archive_key).await {
            Ok(()) => {
                info!(archived = %archive_key, "Staged payload archived");
                ArchiveOutcome::Archived(archive_key)
            }
            Err(source) => {
                let failure = RelocationError {
                    from: staging.clone(),
                    to: archive_key,
                    source,
                };
                error!(error = %failure, "Staged payload could not be archived; reconcile the staging location");
                ArchiveOutcome::RelocationFailed(failure)
            }
        };

        Ok(RawLoadReport { committed, archive })
    }
}
