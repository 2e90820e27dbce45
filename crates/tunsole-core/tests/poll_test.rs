// Polling schedule behaviour against a mock daemon.
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tunsole_api::ApiClient;
use tunsole_core::{
    DeviceStatus, LinkState, PollConfig, PollingController, RefreshOutcome, ResourceKey, Source,
    StatusStore,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, PollingController, Arc<StatusStore>) {
    let server = MockServer::start().await;
    let client = ApiClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    let store = Arc::new(StatusStore::new());
    let poller = PollingController::new(
        Arc::new(client),
        Arc::clone(&store),
        PollConfig {
            device_interval: Duration::from_millis(50),
            slow_interval: Duration::from_millis(50),
        },
        CancellationToken::new(),
    );
    (server, poller, store)
}

fn device_body() -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "name": "tunsocks",
            "exists": true,
            "status": "up",
            "ipAddress": "198.18.0.1/15",
            "mtu": 1500
        }
    })
}

async fn mount_device(server: &MockServer, delay: Duration) {
    Mock::given(method("GET"))
        .and(path("/api/v1/device"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(delay)
                .set_body_json(device_body()),
        )
        .mount(server)
        .await;
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn subscription_fetches_immediately_and_repeats() {
    let (server, poller, store) = setup().await;
    mount_device(&server, Duration::ZERO).await;

    let sub = poller.subscribe(ResourceKey::Device);
    assert!(poller.is_scheduled(ResourceKey::Device));
    tokio::time::sleep(Duration::from_millis(180)).await;

    let snap = store.device().unwrap();
    assert!(snap.value.is_up());
    assert_eq!(snap.source, Source::Poll);
    assert!(request_count(&server).await >= 2);

    drop(sub);
    assert!(!poller.is_scheduled(ResourceKey::Device));
}

#[tokio::test]
async fn tick_is_skipped_while_request_in_flight() {
    let (server, poller, _store) = setup().await;
    mount_device(&server, Duration::from_millis(400)).await;

    let _sub = poller.subscribe(ResourceKey::Device);
    tokio::time::sleep(Duration::from_millis(250)).await;

    // Ticks at ~50/100/150/200ms all found the first request outstanding.
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn result_after_last_unsubscribe_is_discarded() {
    let (server, poller, store) = setup().await;
    mount_device(&server, Duration::from_millis(200)).await;

    let sub = poller.subscribe(ResourceKey::Device);
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(sub);

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(request_count(&server).await, 1);
    assert!(store.device().is_none());
}

#[tokio::test]
async fn schedule_survives_until_last_subscriber_leaves() {
    let (server, poller, _store) = setup().await;
    mount_device(&server, Duration::ZERO).await;

    let first = poller.subscribe(ResourceKey::Device);
    let second = poller.subscribe(ResourceKey::Device);
    drop(first);
    assert!(poller.is_scheduled(ResourceKey::Device));
    drop(second);
    assert!(!poller.is_scheduled(ResourceKey::Device));
}

#[tokio::test]
async fn refresh_is_skipped_while_request_in_flight() {
    let (server, poller, _store) = setup().await;
    mount_device(&server, Duration::from_millis(200)).await;

    let first = {
        let poller = poller.clone();
        tokio::spawn(async move { poller.refresh(ResourceKey::Device).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = poller.refresh(ResourceKey::Device).await.unwrap();
    assert_eq!(second, RefreshOutcome::Skipped);
    assert_eq!(first.await.unwrap().unwrap(), RefreshOutcome::Applied);
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn reanchor_waits_for_in_flight_request_then_fetches() {
    let (server, poller, store) = setup().await;
    mount_device(&server, Duration::from_millis(200)).await;

    let first = {
        let poller = poller.clone();
        tokio::spawn(async move { poller.refresh(ResourceKey::Device).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let issued_after = Utc::now();
    let outcome = poller.reanchor(ResourceKey::Device).await.unwrap();
    assert_eq!(outcome, RefreshOutcome::Applied);
    assert_eq!(first.await.unwrap().unwrap(), RefreshOutcome::Applied);

    assert_eq!(request_count(&server).await, 2);
    // The stored value comes from the request issued after the first finished.
    assert!(store.device().unwrap().observed_at > issued_after + TimeDelta::milliseconds(100));
}

#[tokio::test]
async fn slow_poll_loses_to_newer_observation() {
    let (server, poller, store) = setup().await;
    mount_device(&server, Duration::ZERO).await;

    let pushed = DeviceStatus {
        name: "tunsocks".into(),
        exists: true,
        status: LinkState::Down,
        ip_address: None,
        mtu: None,
    };
    store.put(pushed.clone(), Source::Push, Utc::now() + TimeDelta::hours(1));

    let outcome = poller.refresh(ResourceKey::Device).await.unwrap();
    assert_eq!(outcome, RefreshOutcome::Stale);
    assert_eq!(*store.device().unwrap().value, pushed);
}

#[tokio::test]
async fn routes_refresh_replaces_table() {
    let (server, poller, store) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/routes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [
                {"cidr": "10.0.0.0/8", "gateway": "198.18.0.1", "device": "tunsocks", "metric": 100},
                {"cidr": "172.16.0.0/12", "gateway": "", "device": "tunsocks", "metric": 50}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    poller.refresh(ResourceKey::Routes).await.unwrap();
    let table = store.routes().unwrap();
    let cidrs: Vec<_> = table.value.routes().map(|r| r.cidr.as_str()).collect();
    assert_eq!(cidrs, ["10.0.0.0/8", "172.16.0.0/12"]);
    assert!(table.value.iter().all(|e| e.source == Source::Poll));
}

#[tokio::test]
async fn unauthenticated_failure_is_reported() {
    let (server, poller, store) = setup().await;
    let mut failures = poller.failures();

    Mock::given(method("GET"))
        .and(path("/api/v1/service"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthorized" })),
        )
        .mount(&server)
        .await;

    let err = poller.refresh(ResourceKey::Service).await.unwrap_err();
    assert!(err.is_unauthenticated());

    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.resource, ResourceKey::Service);
    assert!(failure.unauthenticated);
    assert!(store.service().is_none());
}
