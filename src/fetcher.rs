use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::FetchError;
use crate::model::{Record, RecordId, Resolution, Timestamp};

pub const DEFAULT_BASE_URL: &str =
    "https://stats.bungie.net/Platform/Destiny2/Stats/PostGameCarnageReport";
pub const API_KEY_HEADER: &str = "X-API-Key";

/// The single capability the resolver needs from its environment.
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    async fn fetch(&self, id: RecordId) -> Resolution;
}

#[async_trait]
impl<T: RecordFetcher + ?Sized> RecordFetcher for std::sync::Arc<T> {
    async fn fetch(&self, id: RecordId) -> Resolution {
        (**self).fetch(id).await
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Option<Duration>,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            request_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Reads records from the remote service with `GET {base_url}/{id}/`.
pub struct HttpRecordFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRecordFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    pub fn record_url(&self, id: RecordId) -> String {
        format!("{}/{}/", self.base_url, id)
    }

    async fn load(&self, id: RecordId) -> Result<Option<Record>, FetchError> {
        let mut req = self.client.get(self.record_url(id));
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status != StatusCode::OK {
            return Err(FetchError::Status { status: status.as_u16() });
        }

        let body = resp.bytes().await?;
        decode_record(id, &body).map(Some)
    }
}

#[async_trait]
impl RecordFetcher for HttpRecordFetcher {
    async fn fetch(&self, id: RecordId) -> Resolution {
        debug!(id, "fetching record from remote service");
        match self.load(id).await {
            Ok(Some(record)) => Resolution::Found(record),
            Ok(None) => Resolution::Absent,
            Err(e) => Resolution::Error(e),
        }
    }
}

// --- Wire envelope ---

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: Option<ReportBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportBody {
    period: Option<Timestamp>,
    activity_details: Option<ActivityDetails>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityDetails {
    instance_id: Option<String>,
}

/// Decodes the service's JSON envelope into a [`Record`].
pub fn decode_record(id: RecordId, body: &[u8]) -> Result<Record, FetchError> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    let malformed = |reason: &str| FetchError::MalformedRecord {
        id,
        reason: reason.to_string(),
    };

    let report = envelope.response.ok_or_else(|| malformed("missing Response"))?;
    let timestamp = report.period.ok_or_else(|| malformed("missing period"))?;
    let instance_id = report
        .activity_details
        .and_then(|d| d.instance_id)
        .ok_or_else(|| malformed("missing activityDetails.instanceId"))?;

    Ok(Record::new(id, timestamp, instance_id))
}
