use std::time::Duration;

use thiserror::Error;

use crate::model::RecordId;

/// Failure to obtain a resolution from the record service.
///
/// None of these say anything about whether a record exists; "not found"
/// is reported as [`crate::model::Resolution::Absent`] instead.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status code from record service: {status}")]
    Status { status: u16 },

    #[error("could not decode record body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("record {id} is malformed: {reason}")]
    MalformedRecord { id: RecordId, reason: String },

    #[error("fetch timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("record service unavailable: {0}")]
    Unavailable(String),
}

/// Terminal failure of a search.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Retry budget exhausted while probing `id`.
    #[error("search failed probing id {id} after {attempts} attempts: {source}")]
    SearchFailed {
        id: RecordId,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    /// The interval collapsed without a single record being found.
    #[error("no records available between ids {bottom} and {top}")]
    NoRecordsAvailable { bottom: RecordId, top: RecordId },

    #[error("search did not complete within {limit:?}")]
    DeadlineExceeded { limit: Duration },

    #[error("invalid search bounds: lower={lower}, upper={upper}")]
    InvalidBounds { lower: RecordId, upper: RecordId },
}

/// A caller-supplied target that could not be turned into a timestamp.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid target timestamp '{input}': {reason}")]
pub struct InvalidTarget {
    pub input: String,
    pub reason: String,
}
