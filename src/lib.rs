pub mod model;
pub mod error;
pub mod fetcher;
pub mod cache;
pub mod retry;
pub mod resolver;
pub mod parser;
pub mod config;
pub mod server;

pub use cache::RecordCache;
pub use error::{FetchError, InvalidTarget, SearchError};
pub use fetcher::{HttpFetcherConfig, HttpRecordFetcher, RecordFetcher};
pub use model::{Match, Record, RecordId, Resolution, Timestamp};
pub use resolver::{Resolver, ResolverOptions, SearchBounds, SearchInterval};
pub use retry::RetryPolicy;
