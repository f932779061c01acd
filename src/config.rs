use std::time::Duration;

use clap::Args;

use crate::error::SearchError;
use crate::fetcher::{HttpFetcherConfig, DEFAULT_BASE_URL};
use crate::model::RecordId;
use crate::resolver::{ResolverOptions, SearchBounds};
use crate::retry::RetryPolicy;

/// Record service and search tuning shared by both binaries.
#[derive(Args, Clone, Debug)]
pub struct SearchArgs {
    /// Base URL of the record service; records live at `{base}/{id}/`
    #[clap(long, env = "CHRONOS_SEEK_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Sent as the X-API-Key header when set
    #[clap(long, env = "CHRONOS_SEEK_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Attempts per identifier before a search fails
    #[clap(long, env = "CHRONOS_SEEK_MAX_ATTEMPTS", default_value = "5")]
    pub max_attempts: u32,

    #[clap(long, env = "CHRONOS_SEEK_BACKOFF_MS", default_value = "200")]
    pub backoff_ms: u64,

    #[clap(long, env = "CHRONOS_SEEK_MAX_BACKOFF_MS", default_value = "5000")]
    pub max_backoff_ms: u64,

    #[clap(long, env = "CHRONOS_SEEK_FETCH_TIMEOUT_MS", default_value = "10000")]
    pub fetch_timeout_ms: u64,

    /// Limit on one whole search, 0 disables
    #[clap(long, env = "CHRONOS_SEEK_DEADLINE_MS", default_value = "120000")]
    pub deadline_ms: u64,

    /// Highest identifier the search starts from
    #[clap(long, env = "CHRONOS_SEEK_UPPER_BOUND", default_value_t = RecordId::MAX)]
    pub upper_bound: RecordId,
}

impl SearchArgs {
    fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_ms > 0).then(|| Duration::from_millis(self.fetch_timeout_ms))
    }

    pub fn fetcher_config(&self) -> HttpFetcherConfig {
        HttpFetcherConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            request_timeout: self.fetch_timeout(),
        }
    }

    pub fn resolver_options(&self) -> Result<ResolverOptions, SearchError> {
        Ok(ResolverOptions {
            bounds: SearchBounds::new(1, self.upper_bound)?,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.backoff_ms),
                max_delay: Duration::from_millis(self.max_backoff_ms),
                ..RetryPolicy::default()
            },
            fetch_timeout: self.fetch_timeout(),
            deadline: (self.deadline_ms > 0).then(|| Duration::from_millis(self.deadline_ms)),
        })
    }
}

/// Installs the fmt subscriber, defaulting `RUST_LOG` when it is unset.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_level(true)
    .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[clap(flatten)]
        search: SearchArgs,
    }

    #[test]
    fn defaults_produce_bounded_search() {
        let args = Harness::parse_from(["test"]).search;
        let options = args.resolver_options().unwrap();

        assert_eq!(options.bounds, SearchBounds::default());
        assert_eq!(options.retry.max_attempts, 5);
        assert_eq!(options.fetch_timeout, Some(Duration::from_secs(10)));
        assert_eq!(options.deadline, Some(Duration::from_secs(120)));
        assert_eq!(args.fetcher_config().base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn zero_disables_limits() {
        let args = Harness::parse_from([
            "test",
            "--deadline-ms", "0",
            "--fetch-timeout-ms", "0",
            "--upper-bound", "5000",
        ])
        .search;
        let options = args.resolver_options().unwrap();

        assert_eq!(options.deadline, None);
        assert_eq!(options.fetch_timeout, None);
        assert_eq!(args.fetcher_config().request_timeout, None);
        assert_eq!(options.bounds.upper(), 5000);
    }

    #[test]
    fn bad_upper_bound_is_rejected() {
        let args = Harness::parse_from(["test", "--upper-bound", "1"]).search;
        assert!(matches!(args.resolver_options(), Err(SearchError::InvalidBounds { .. })));
    }
}
