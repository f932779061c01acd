//! Bisection over the identifier space.
//!
//! Timestamps are assumed non-decreasing in identifier order, except where
//! identifiers resolve to nothing. A gap is taken to mean the probe landed
//! beyond the newest record, so the search continues below it.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::RecordCache;
use crate::error::{FetchError, SearchError};
use crate::fetcher::RecordFetcher;
use crate::model::{Match, Record, RecordId, Resolution, Timestamp};
use crate::retry::RetryPolicy;

/// Inclusive identifier range a search starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBounds {
    lower: RecordId,
    upper: RecordId,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self { lower: 1, upper: RecordId::MAX }
    }
}

impl SearchBounds {
    pub fn new(lower: RecordId, upper: RecordId) -> Result<Self, SearchError> {
        if lower < 1 || upper <= lower {
            return Err(SearchError::InvalidBounds { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> RecordId {
        self.lower
    }

    pub fn upper(&self) -> RecordId {
        self.upper
    }
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub bounds: SearchBounds,
    pub retry: RetryPolicy,
    /// Limit on a single fetch; expiry counts as a transient error
    pub fetch_timeout: Option<Duration>,
    /// Limit on a whole `resolve` call
    pub deadline: Option<Duration>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            bounds: SearchBounds::default(),
            retry: RetryPolicy::default(),
            fetch_timeout: Some(Duration::from_secs(10)),
            deadline: Some(Duration::from_secs(120)),
        }
    }
}

/// State of one in-progress search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchInterval {
    pub bottom: RecordId,
    pub top: RecordId,
}

impl SearchInterval {
    pub fn new(bounds: SearchBounds) -> Self {
        Self { bottom: bounds.lower, top: bounds.upper }
    }

    pub fn span(&self) -> i64 {
        self.top - self.bottom
    }

    /// Never equal to `bottom`; equal to `top` once the span is 1.
    pub fn midpoint(&self) -> RecordId {
        let step = (self.span() / 2).max(1);
        self.bottom + step
    }

    pub fn is_collapsed(&self) -> bool {
        self.span() <= 1
    }
}

pub struct Resolver<F> {
    fetcher: F,
    cache: Arc<RecordCache>,
    options: ResolverOptions,
}

impl<F: RecordFetcher> Resolver<F> {
    /// Resolver with its own private cache.
    pub fn new(fetcher: F, options: ResolverOptions) -> Self {
        Self::with_cache(fetcher, Arc::new(RecordCache::new()), options)
    }

    /// Resolver sharing `cache` with other resolvers.
    pub fn with_cache(fetcher: F, cache: Arc<RecordCache>, options: ResolverOptions) -> Self {
        Self { fetcher, cache, options }
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    /// Finds the record whose timestamp equals `target`, or the closest one
    /// reachable along the bisection path.
    pub async fn resolve(&self, target: Timestamp) -> Result<Match, SearchError> {
        let found = match self.options.deadline {
            Some(limit) => tokio::time::timeout(limit, self.search(target))
                .await
                .map_err(|_| SearchError::DeadlineExceeded { limit })?,
            None => self.search(target).await,
        }?;

        info!(
            at = %target,
            id = found.record.id,
            exact = found.exact,
            probes = found.probes,
            "search complete"
        );
        Ok(found)
    }

    async fn search(&self, target: Timestamp) -> Result<Match, SearchError> {
        let mut interval = SearchInterval::new(self.options.bounds);
        let mut last_found: Option<Record> = None;
        let mut probes = 0u32;

        loop {
            let span = interval.span();
            let mid = interval.midpoint();
            debug!(bottom = interval.bottom, top = interval.top, mid, "probing");
            probes += 1;

            let Some(record) = self.probe(mid).await? else {
                // Gap: everything from here up is treated as beyond the newest record.
                interval.top = mid;
                if interval.is_collapsed() {
                    return self.collapse(interval, last_found, target, probes).await;
                }
                continue;
            };

            let done = match record.timestamp.cmp(&target) {
                Ordering::Equal => {
                    return Ok(Match { record, exact: true, probes });
                }
                Ordering::Less => {
                    let done = interval.bottom == mid || span == 1;
                    if !done {
                        interval.bottom = mid;
                    }
                    done
                }
                Ordering::Greater => {
                    let done = interval.top == mid || span == 1;
                    if !done {
                        interval.top = mid;
                    }
                    done
                }
            };

            if done {
                if record.timestamp > target && interval.bottom == self.options.bounds.lower {
                    return self.settle_at_lower_bound(record, target, probes).await;
                }
                return Ok(Match { record, exact: false, probes });
            }
            last_found = Some(record);
        }
    }

    /// The interval was pinned shut by a gap.
    async fn collapse(
        &self,
        interval: SearchInterval,
        last_found: Option<Record>,
        target: Timestamp,
        mut probes: u32,
    ) -> Result<Match, SearchError> {
        if let Some(record) = last_found {
            return Ok(Match { record, exact: false, probes });
        }

        // The midpoint rule never visits `bottom` itself.
        probes += 1;
        match self.probe(interval.bottom).await? {
            Some(record) => {
                let exact = record.timestamp == target;
                Ok(Match { record, exact, probes })
            }
            None => Err(SearchError::NoRecordsAvailable {
                bottom: self.options.bounds.lower,
                top: interval.top,
            }),
        }
    }

    /// The search stopped just above the lower bound, which the midpoint
    /// rule never visits. The record there wins if it is nearer the target.
    async fn settle_at_lower_bound(
        &self,
        above: Record,
        target: Timestamp,
        mut probes: u32,
    ) -> Result<Match, SearchError> {
        probes += 1;
        let Some(lowest) = self.probe(self.options.bounds.lower).await? else {
            return Ok(Match { record: above, exact: false, probes });
        };

        if lowest.timestamp == target {
            return Ok(Match { record: lowest, exact: true, probes });
        }
        let record = if distance(lowest.timestamp, target) < distance(above.timestamp, target) {
            lowest
        } else {
            above
        };
        Ok(Match { record, exact: false, probes })
    }

    /// Resolves one identifier, retrying transient errors under the policy.
    /// `Ok(None)` means the identifier is a gap.
    async fn probe(&self, id: RecordId) -> Result<Option<Record>, SearchError> {
        let policy = &self.options.retry;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let resolution = self.cache.get_or_fetch(id, || self.fetch_once(id)).await;

            match resolution {
                Resolution::Found(record) => return Ok(Some(record)),
                Resolution::Absent => return Ok(None),
                Resolution::Error(cause) => {
                    if !policy.should_retry(attempt) {
                        return Err(SearchError::SearchFailed { id, attempts: attempt, source: cause });
                    }
                    let delay = policy.backoff(attempt);
                    warn!(id, attempt, ?delay, error = %cause, "fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn fetch_once(&self, id: RecordId) -> Resolution {
        match self.options.fetch_timeout {
            Some(after) => tokio::time::timeout(after, self.fetcher.fetch(id))
                .await
                .unwrap_or_else(|_| Resolution::Error(FetchError::Timeout { after })),
            None => self.fetcher.fetch(id).await,
        }
    }
}

fn distance(a: Timestamp, b: Timestamp) -> chrono::Duration {
    if a > b { a - b } else { b - a }
}
