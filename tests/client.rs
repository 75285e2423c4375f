//! Integration tests for the resilient client: cache and dedup semantics,
//! rate-limit handling, and node failover against scripted upstreams.
mod common;

use canton_scan_sdk::client::{Client, ClientConfig};
use canton_scan_sdk::endpoints::{ApiError, Endpoint};
use common::{fixed, json_response, MockUpstream};
use hyper::{Body, Response};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

fn client_for(urls: &[String]) -> Client {
    client_with(urls, |config| config)
}

fn client_with(
    urls: &[String],
    tune: impl FnOnce(ClientConfig) -> ClientConfig,
) -> Client {
    let endpoints = urls
        .iter()
        .enumerate()
        .map(|(i, url)| Endpoint::new(url.clone(), format!("node{i}"), i as u32 + 1))
        .collect();
    Client::new(tune(ClientConfig::new(endpoints))).expect("client construction")
}

#[tokio::test]
async fn repeated_reads_within_ttl_hit_the_cache() {
    let upstream = MockUpstream::spawn(fixed(200, r#"{"consensusHeight": 7}"#));
    let client = client_for(&[upstream.url()]);

    let first = client.fetch("/api/overview", &[]).await.unwrap();
    let second = client.fetch("/api/overview", &[]).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn cache_expires_after_the_ttl() {
    let upstream = MockUpstream::spawn(fixed(200, r#"{"consensusHeight": 7}"#));
    let client = client_with(&[upstream.url()], |config| {
        config.set_cache_ttl(Duration::from_millis(40))
    });

    client.fetch("/api/overview", &[]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    client.fetch("/api/overview", &[]).await.unwrap();

    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn clearing_the_cache_forces_a_fresh_read() {
    let upstream = MockUpstream::spawn(fixed(200, r#"{"consensusHeight": 7}"#));
    let client = client_for(&[upstream.url()]);

    client.fetch("/api/overview", &[]).await.unwrap();
    client.clear_cache();
    client.fetch("/api/overview", &[]).await.unwrap();

    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn concurrent_identical_reads_share_one_request() {
    let upstream = MockUpstream::spawn(Arc::new(|_, _| {
        (
            Duration::from_millis(100),
            json_response(200, r#"{"value": 1}"#),
        )
    }));
    let client = client_for(&[upstream.url()]);

    let (a, b, c) = tokio::join!(
        client.fetch("/api/overview", &[]),
        client.fetch("/api/overview", &[]),
        client.fetch("/api/overview", &[]),
    );

    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a, c.unwrap());
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn concurrent_identical_reads_share_one_failure() {
    let upstream = MockUpstream::spawn(Arc::new(|_, _| {
        (Duration::from_millis(50), json_response(404, r#"{}"#))
    }));
    let client = client_for(&[upstream.url()]);

    let (a, b) = tokio::join!(
        client.fetch("/api/overview", &[]),
        client.fetch("/api/overview", &[]),
    );

    for result in [a, b] {
        match result {
            Err(ApiError::UpstreamRejected { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected rejection, got {other:?}"),
        }
    }
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn failed_requests_are_not_cached() {
    let upstream = MockUpstream::spawn(Arc::new(|n, _| {
        let response = if n == 0 {
            json_response(500, r#"{}"#)
        } else {
            json_response(200, r#"{"value": 1}"#)
        };
        (Duration::ZERO, response)
    }));
    let client = client_with(&[upstream.url()], |config| config.set_max_retries(1));

    let first = client.fetch("/api/overview", &[]).await;
    assert!(matches!(
        first,
        Err(ApiError::UpstreamUnavailable {
            status: Some(500),
            ..
        })
    ));

    let second = client.fetch("/api/overview", &[]).await.unwrap();
    assert_eq!(second["value"], 1);
    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn fails_over_to_a_healthy_node() {
    let broken = MockUpstream::spawn(fixed(500, r#"{}"#));
    let healthy = MockUpstream::spawn(fixed(200, r#"{"value": 1}"#));
    let client = client_for(&[broken.url(), healthy.url()]);

    let value = client.fetch("/api/overview", &[]).await.unwrap();
    assert_eq!(value["value"], 1);

    let status = client.node_status();
    assert!(!status[0].is_active);
    assert!(status[1].is_active);
    assert!(status[0].consecutive_errors >= 1);
    assert_eq!(status[1].consecutive_errors, 0);
    assert_eq!(broken.hits(), 1);
    assert_eq!(healthy.hits(), 1);
}

#[tokio::test]
async fn network_errors_fail_over_to_the_next_node() {
    // Grab a port with nothing listening on it.
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        format!("http://{addr}")
    };
    let healthy = MockUpstream::spawn(fixed(200, r#"{"value": 1}"#));
    let client = client_for(&[dead, healthy.url()]);

    let value = client.fetch("/api/overview", &[]).await.unwrap();
    assert_eq!(value["value"], 1);
    assert_eq!(healthy.hits(), 1);
}

#[tokio::test]
async fn rate_limiting_exhausts_the_retry_budget() {
    let upstream = MockUpstream::spawn(Arc::new(|_, _| {
        let response = Response::builder()
            .status(429)
            .header("Retry-After", "7")
            .body(Body::from("{}"))
            .expect("static response");
        (Duration::ZERO, response)
    }));
    let client = client_for(&[upstream.url()]);

    match client.fetch("/api/overview", &[]).await {
        Err(ApiError::RateLimited { retry_after, .. }) => {
            assert_eq!(retry_after, Some(7));
        }
        other => panic!("expected rate limit error, got {other:?}"),
    }
    // Default budget of three attempts, all against the only node.
    assert_eq!(upstream.hits(), 3);
}

#[tokio::test]
async fn other_client_errors_are_not_retried() {
    let upstream = MockUpstream::spawn(fixed(404, r#"{}"#));
    let client = client_for(&[upstream.url()]);

    match client.fetch("/api/missing", &[]).await {
        Err(ApiError::UpstreamRejected { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn rate_limit_headers_are_tracked_per_node() {
    let upstream = MockUpstream::spawn(Arc::new(|_, _| {
        let response = Response::builder()
            .status(200)
            .header("X-RateLimit-Remaining", "42")
            .header("X-RateLimit-Reset", "2000000000")
            .header("X-RateLimit-Limit", "100")
            .body(Body::from(r#"{"value": 1}"#))
            .expect("static response");
        (Duration::ZERO, response)
    }));
    let client = client_for(&[upstream.url()]);

    client.fetch("/api/overview", &[]).await.unwrap();

    let status = client.node_status();
    let info = status[0].rate_limit.expect("rate limit recorded");
    assert_eq!(info.remaining, 42);
    assert_eq!(info.reset, 2_000_000_000);
    assert_eq!(info.limit, 100);
}

#[tokio::test]
async fn distinct_query_parameters_do_not_share_cache_entries() {
    let upstream = MockUpstream::spawn(fixed(200, r#"{"updates": []}"#));
    let client = client_for(&[upstream.url()]);

    client
        .fetch("/api/v2/updates", &[("limit", "500")])
        .await
        .unwrap();
    client
        .fetch("/api/v2/updates", &[("limit", "100")])
        .await
        .unwrap();
    // Same parameters in a different order normalize to the same entry.
    client
        .fetch("/api/v2/updates", &[("limit", "500")])
        .await
        .unwrap();

    assert_eq!(upstream.hits(), 2);
}
