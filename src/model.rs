use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Key into the remote record space. Valid keys are `1..=i64::MAX`, with gaps.
pub type RecordId = i64;

/// Wall-clock instant. Equality is instant equality, independent of the
/// offset the remote service reported.
pub type Timestamp = DateTime<Utc>;

/// A timestamped record as returned by the remote service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Identifier the record was fetched under
    pub id: RecordId,

    /// When the recorded activity started
    pub timestamp: Timestamp,

    /// Opaque reference handed back to the caller
    pub instance_id: String,
}

impl Record {
    pub fn new(id: RecordId, timestamp: Timestamp, instance_id: impl Into<String>) -> Self {
        Self {
            id,
            timestamp,
            instance_id: instance_id.into(),
        }
    }
}

/// Outcome of probing a single identifier.
#[derive(Debug)]
pub enum Resolution {
    Found(Record),
    /// No record exists at this identifier (gap or beyond the newest one)
    Absent,
    /// Says nothing about whether a record exists
    Error(FetchError),
}

/// Terminal result of a successful search.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub record: Record,
    /// `true` only when the record's timestamp equals the target instant
    pub exact: bool,
    /// Identifiers probed during this search, cache hits included
    pub probes: u32,
}

impl Match {
    /// Human-readable summary, matching the wording the HTTP surface returns.
    pub fn describe(&self) -> String {
        if self.exact {
            format!("Found exact match ID={}", self.record.instance_id)
        } else {
            format!("Closest match ID={}", self.record.instance_id)
        }
    }
}
