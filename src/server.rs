use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Filter;

use crate::error::SearchError;
use crate::fetcher::RecordFetcher;
use crate::model::{Match, RecordId, Timestamp};
use crate::parser::parse_target;
use crate::resolver::Resolver;

#[derive(Deserialize, Debug, Default)]
pub struct FindQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct FindResponse {
    pub id: RecordId,
    pub instance_id: String,
    pub timestamp: Timestamp,
    pub exact: bool,
    pub probes: u32,
    pub message: String,
}

impl From<Match> for FindResponse {
    fn from(found: Match) -> Self {
        let message = found.describe();
        Self {
            id: found.record.id,
            instance_id: found.record.instance_id,
            timestamp: found.record.timestamp,
            exact: found.exact,
            probes: found.probes,
            message,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct StatsResponse {
    pub cached_records: usize,
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    error: String,
}

type Reply = WithStatus<Json>;

pub struct SeekServer<F> {
    resolver: Arc<Resolver<F>>,
}

impl<F: RecordFetcher + 'static> SeekServer<F> {
    pub fn new(resolver: Arc<Resolver<F>>) -> Self {
        Self { resolver }
    }

    pub async fn run(&self, addr: SocketAddr) {
        info!(%addr, "listening");
        warp::serve(routes(self.resolver.clone())).run(addr).await;
    }
}

/// `GET /find?start=<RFC3339|now>` and `GET /stats`.
pub fn routes<F: RecordFetcher + 'static>(
    resolver: Arc<Resolver<F>>,
) -> impl Filter<Extract = (Reply,), Error = warp::Rejection> + Clone {
    let find = warp::get()
    .and(warp::path("find"))
    .and(warp::path::end())
    .and(warp::query::<FindQuery>())
    .and(with_resolver(resolver.clone()))
    .and_then(handle_find::<F>);

    let stats = warp::get()
    .and(warp::path("stats"))
    .and(warp::path::end())
    .and(with_resolver(resolver))
    .map(|resolver: Arc<Resolver<F>>| {
        let body = StatsResponse { cached_records: resolver.cache().len() };
        warp::reply::with_status(warp::reply::json(&body), StatusCode::OK)
    });

    find.or(stats).unify()
}

fn with_resolver<F: RecordFetcher + 'static>(
    resolver: Arc<Resolver<F>>,
) -> impl Filter<Extract = (Arc<Resolver<F>>,), Error = Infallible> + Clone {
    warp::any().map(move || resolver.clone())
}

async fn handle_find<F: RecordFetcher + 'static>(
    query: FindQuery,
    resolver: Arc<Resolver<F>>,
) -> Result<Reply, Infallible> {
    let raw = match (&query.start, &query.end) {
        (Some(start), _) => start,
        (None, Some(_)) => {
            return Ok(error_reply(StatusCode::BAD_REQUEST, "searching by end time is not supported".into()));
        }
        (None, None) => {
            return Ok(error_reply(StatusCode::BAD_REQUEST, "missing 'start' parameter".into()));
        }
    };

    let target = match parse_target(raw) {
        Ok(target) => target.instant(),
        Err(e) => {
            warn!(error = %e, "rejected find request");
            return Ok(error_reply(StatusCode::BAD_REQUEST, e.to_string()));
        }
    };

    info!(at = %target, "find requested");
    match resolver.resolve(target).await {
        Ok(found) => {
            let body = FindResponse::from(found);
            Ok(warp::reply::with_status(warp::reply::json(&body), StatusCode::OK))
        }
        Err(e) => {
            error!(error = %e, at = %target, "search failed");
            Ok(error_reply(status_for(&e), e.to_string()))
        }
    }
}

fn status_for(err: &SearchError) -> StatusCode {
    match err {
        SearchError::NoRecordsAvailable { .. } => StatusCode::NOT_FOUND,
        SearchError::SearchFailed { .. } => StatusCode::BAD_GATEWAY,
        SearchError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        SearchError::InvalidBounds { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(status: StatusCode, error: String) -> Reply {
    warp::reply::with_status(warp::reply::json(&ErrorBody { error }), status)
}
