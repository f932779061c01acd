mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chronos_seek::fetcher::API_KEY_HEADER;
use chronos_seek::{
    FetchError, HttpFetcherConfig, HttpRecordFetcher, RecordFetcher, Resolution, Resolver,
    ResolverOptions, RetryPolicy, SearchBounds,
};
use common::t;
use warp::http::StatusCode;
use warp::Filter;

const NEWEST: i64 = 300;

/// Fake record service: `/reports/{id}/` for ids `1..=NEWEST`, 404 above,
/// 503 for id 13, and a body without a timestamp for id 77.
async fn spawn_service(hits: Arc<AtomicUsize>) -> SocketAddr {
    let reports = warp::get()
    .and(warp::path("reports"))
    .and(warp::path::param::<i64>())
    .and(warp::header::optional::<String>(API_KEY_HEADER))
    .map(move |id: i64, key: Option<String>| {
        hits.fetch_add(1, Ordering::SeqCst);
        if key.as_deref() != Some("secret") {
            return warp::reply::with_status(warp::reply::json(&serde_json::json!({})), StatusCode::UNAUTHORIZED);
        }
        match id {
            13 => warp::reply::with_status(warp::reply::json(&serde_json::json!({})), StatusCode::SERVICE_UNAVAILABLE),
            77 => warp::reply::with_status(
                warp::reply::json(&serde_json::json!({ "Response": { "activityDetails": { "instanceId": "77" } } })),
                StatusCode::OK,
            ),
            1..=NEWEST => {
                let body = serde_json::json!({
                    "Response": {
                        "period": t(id).to_rfc3339(),
                        "activityDetails": { "instanceId": format!("{}", 9_000_000 + id) }
                    },
                    "ErrorCode": 1
                });
                warp::reply::with_status(warp::reply::json(&body), StatusCode::OK)
            }
            _ => warp::reply::with_status(warp::reply::json(&serde_json::json!({})), StatusCode::NOT_FOUND),
        }
    });

    let (addr, server) = warp::serve(reports).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

fn fetcher(addr: SocketAddr, key: Option<&str>) -> HttpRecordFetcher {
    HttpRecordFetcher::new(HttpFetcherConfig {
        base_url: format!("http://{}/reports", addr),
        api_key: key.map(str::to_string),
        request_timeout: Some(Duration::from_secs(5)),
    })
    .unwrap()
}

#[tokio::test]
async fn maps_statuses_onto_resolutions() {
    let addr = spawn_service(Arc::new(AtomicUsize::new(0))).await;
    let fetcher = fetcher(addr, Some("secret"));

    match fetcher.fetch(42).await {
        Resolution::Found(record) => {
            assert_eq!(record.id, 42);
            assert_eq!(record.timestamp, t(42));
            assert_eq!(record.instance_id, "9000042");
        }
        other => panic!("expected record, got {:?}", other),
    }

    assert!(matches!(fetcher.fetch(NEWEST + 1).await, Resolution::Absent));
    assert!(matches!(
        fetcher.fetch(13).await,
        Resolution::Error(FetchError::Status { status: 503 })
    ));
    assert!(matches!(
        fetcher.fetch(77).await,
        Resolution::Error(FetchError::MalformedRecord { id: 77, .. })
    ));
}

#[tokio::test]
async fn api_key_is_sent() {
    let addr = spawn_service(Arc::new(AtomicUsize::new(0))).await;

    let anonymous = fetcher(addr, None);
    assert!(matches!(
        anonymous.fetch(5).await,
        Resolution::Error(FetchError::Status { status: 401 })
    ));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let fetcher = HttpRecordFetcher::new(HttpFetcherConfig {
        base_url: "http://127.0.0.1:1/reports".into(),
        api_key: None,
        request_timeout: Some(Duration::from_secs(2)),
    })
    .unwrap();

    assert!(matches!(
        fetcher.fetch(1).await,
        Resolution::Error(FetchError::Transport(_))
    ));
}

#[tokio::test]
async fn resolves_against_live_service() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_service(hits.clone()).await;
    let resolver = Resolver::new(fetcher(addr, Some("secret")), ResolverOptions {
        retry: RetryPolicy::immediate(2),
        ..Default::default()
    });

    let found = resolver.resolve(t(200)).await.unwrap();
    assert!(found.exact);
    assert_eq!(found.record.instance_id, "9000200");

    let found = resolver.resolve(t(NEWEST) + chrono::Duration::minutes(90)).await.unwrap();
    assert!(!found.exact);
    assert_eq!(found.record.id, NEWEST);

    // Repeating a search only re-asks about gaps.
    let before = hits.load(Ordering::SeqCst);
    let again = resolver.resolve(t(200)).await.unwrap();
    assert_eq!(again.record.id, 200);
    let refetched = hits.load(Ordering::SeqCst) - before;
    assert!(refetched < again.probes as usize, "{} of {} probes refetched", refetched, again.probes);
}

#[tokio::test]
async fn failing_identifier_exhausts_retries() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_service(hits.clone()).await;
    let resolver = Resolver::new(fetcher(addr, Some("secret")), ResolverOptions {
        bounds: SearchBounds::new(1, 25).unwrap(),
        retry: RetryPolicy::immediate(3),
        ..Default::default()
    });

    // 1..=25 bisects straight onto 13.
    let err = resolver.resolve(t(2)).await.unwrap_err();
    assert_eq!(err.to_string(), "search failed probing id 13 after 3 attempts: unexpected status code from record service: 503");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}
