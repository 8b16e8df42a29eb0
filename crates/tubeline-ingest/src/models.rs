//! Bronze and silver record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TableError;

/// Promotion state of a raw record. `Unpromoted -> Promoted` is the only
/// transition; `Promoted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    #[default]
    Unpromoted,
    Promoted,
}

impl PromotionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionStatus::Unpromoted => "unpromoted",
            PromotionStatus::Promoted => "promoted",
        }
    }

    pub fn is_promoted(&self) -> bool {
        matches!(self, PromotionStatus::Promoted)
    }
}

impl FromStr for PromotionStatus {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpromoted" => Ok(PromotionStatus::Unpromoted),
            "promoted" => Ok(PromotionStatus::Promoted),
            other => Err(TableError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for PromotionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line object of the feed, every field kept as opaque text.
///
/// Structured fields (`crowding`, `lineStatuses`, ...) hold their JSON
/// encoding; decoding is deferred to the transform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedLine {
    /// `$type` in the feed
    pub record_type: Option<String>,
    pub created: Option<String>,
    pub crowding: Option<String>,
    pub disruptions: Option<String>,
    pub id: Option<String>,
    pub line_statuses: Option<String>,
    pub mode_name: Option<String>,
    pub modified: Option<String>,
    pub name: Option<String>,
    pub route_sections: Option<String>,
    pub service_types: Option<String>,
}

/// A raw record ready to be appended; the table assigns the identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRawRecord {
    pub line: FeedLine,
    pub promotion_status: PromotionStatus,
    /// Ingestion wall-clock time
    pub created_timestamp: DateTime<Utc>,
}

impl NewRawRecord {
    pub fn unpromoted(line: FeedLine, created_timestamp: DateTime<Utc>) -> Self {
        Self {
            line,
            promotion_status: PromotionStatus::Unpromoted,
            created_timestamp,
        }
    }
}

/// A committed bronze row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStatusRecord {
    pub identity_key: i64,
    pub line: FeedLine,
    pub promotion_status: PromotionStatus,
    pub created_timestamp: DateTime<Utc>,
}

/// A silver row: one line-status entry of one raw record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleansedStatusRecord {
    /// Originating raw record (not unique here)
    pub identity_key: i64,
    /// Ingestion time of the originating raw record
    pub observation_timestamp: DateTime<Utc>,
    pub line: Option<String>,
    /// `None` when the entry carries no severity
    pub status_severity: Option<i32>,
    pub status_severity_description: Option<String>,
    pub disruption_reason: Option<String>,
    /// Transform time
    pub created_timestamp: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_status_round_trip_names() {
        assert_eq!("unpromoted".parse::<PromotionStatus>().unwrap(), PromotionStatus::Unpromoted);
        assert_eq!("promoted".parse::<PromotionStatus>().unwrap(), PromotionStatus::Promoted);
        assert_eq!(PromotionStatus::Promoted.to_string(), "promoted");
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = "Y".parse::<PromotionStatus>().unwrap_err();
        assert!(matches!(err, TableError::InvalidStatus(ref s) if s == "Y"));
    }

    #[test]
    fn test_new_records_start_unpromoted() {
        let record = NewRawRecord::unpromoted(FeedLine::default(), Utc::now());
        assert!(!record.promotion_status.is_promoted());
    }
}
