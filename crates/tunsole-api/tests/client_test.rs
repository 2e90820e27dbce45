// Integration tests for `ApiClient` using wiremock.
#![allow(clippy::unwrap_used)]

use futures_util::StreamExt;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tunsole_api::{AddRouteRequest, ApiClient, Error, ProxyConfigPayload};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, ApiClient) {
    let server = MockServer::start().await;
    let client = ApiClient::from_reqwest(&server.uri(), reqwest::Client::new())
        .unwrap()
        .with_token(SecretString::from("s3cret".to_owned()));
    (server, client)
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_get_device_sends_bearer_and_unwraps_envelope() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/device"))
        .and(header("Authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Device status retrieved",
            "data": {
                "name": "tunsocks",
                "exists": true,
                "status": "up",
                "ipAddress": "198.18.0.1/15",
                "mtu": 1500
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let device = client.get_device().await.unwrap();
    assert_eq!(device.name, "tunsocks");
    assert!(device.exists);
    assert_eq!(device.ip_address, "198.18.0.1/15");
    assert_eq!(device.mtu, 1500);
}

#[tokio::test]
async fn test_get_service_with_traffic() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/service"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Service status retrieved",
            "data": {
                "running": true,
                "pid": 4242,
                "uptime": 90,
                "connections": 3,
                "memoryUsage": 1_048_576,
                "cpuUsage": 0.0,
                "proxy": "127.0.0.1:7891",
                "traffic": {
                    "uploadBytes": 100,
                    "downloadBytes": 2000,
                    "uploadSpeed": 10,
                    "downloadSpeed": 20
                }
            }
        })))
        .mount(&server)
        .await;

    let service = client.get_service().await.unwrap();
    assert!(service.running);
    assert_eq!(service.pid, 4242);
    assert_eq!(service.connections, 3);
    let traffic = service.traffic.unwrap();
    assert_eq!(traffic.download_bytes, 2000);
    assert_eq!(traffic.upload_speed, 10);
}

#[tokio::test]
async fn test_list_routes() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/routes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Routes retrieved",
            "data": [
                { "cidr": "10.0.0.0/8", "gateway": "198.18.0.1", "device": "tunsocks", "metric": 100 },
                { "cidr": "192.168.1.5/32", "gateway": "", "device": "tunsocks", "metric": 0 }
            ]
        })))
        .mount(&server)
        .await;

    let routes = client.list_routes().await.unwrap();
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].cidr, "10.0.0.0/8");
    assert_eq!(routes[1].gateway, "");
}

#[tokio::test]
async fn test_add_route_posts_body_and_returns_server_entry() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/routes"))
        .and(body_json(json!({ "cidr": "192.168.1.5/32", "gateway": "198.18.0.1", "metric": 100 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Route added successfully",
            "data": { "cidr": "192.168.1.5/32", "gateway": "198.18.0.1", "device": "tunsocks", "metric": 100 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let req = AddRouteRequest {
        cidr: "192.168.1.5/32".into(),
        gateway: "198.18.0.1".into(),
        metric: 100,
    };
    let route = client.add_route(&req).await.unwrap().unwrap();
    assert_eq!(route.device, "tunsocks");
}

#[tokio::test]
async fn test_add_route_without_data_returns_none() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/routes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "message": "Route added successfully" })),
        )
        .mount(&server)
        .await;

    let req = AddRouteRequest {
        cidr: "10.1.0.0/16".into(),
        gateway: "198.18.0.1".into(),
        metric: 100,
    };
    assert!(client.add_route(&req).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_route_percent_encodes_cidr() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/routes/10.0.0.0%2F8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Route deleted successfully"
        })))
        .expect(1)
        .mount(&server)
        .await;

    client.delete_route("10.0.0.0/8").await.unwrap();
}

#[tokio::test]
async fn test_save_proxy() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/proxy"))
        .and(body_json(json!({ "type": "socks5", "address": "127.0.0.1:7891", "username": "u", "password": "p" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Proxy config saved successfully (requires restart)"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = ProxyConfigPayload {
        proxy_type: "socks5".into(),
        address: "127.0.0.1:7891".into(),
        username: Some("u".into()),
        password: Some("p".into()),
    };
    client.save_proxy(&cfg).await.unwrap();
}

#[tokio::test]
async fn test_login_is_public() {
    let server = MockServer::start().await;
    let client = ApiClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .and(body_json(json!({ "token": "abc" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Authentication successful",
            "data": { "token": "abc", "expiresIn": 0 }
        })))
        .mount(&server)
        .await;

    let grant = client.login("abc").await.unwrap();
    assert_eq!(grant.token, "abc");
    assert_eq!(grant.expires_in, 0);
    assert!(!client.has_token());
}

// ── Error-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/routes"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthorized" })))
        .mount(&server)
        .await;

    let err = client.list_routes().await.unwrap_err();
    assert!(err.is_unauthorized(), "got {err:?}");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_rejection_carries_server_message() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/routes"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "TUN device not found. Start the device first."
        })))
        .mount(&server)
        .await;

    let req = AddRouteRequest {
        cidr: "10.0.0.0/8".into(),
        gateway: "198.18.0.1".into(),
        metric: 100,
    };
    let err = client.add_route(&req).await.unwrap_err();
    match &err {
        Error::Rejected { status, message } => {
            assert_eq!(*status, Some(409));
            assert_eq!(message.as_deref(), Some("TUN device not found. Start the device first."));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_success_false_envelope_is_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/proxy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Uninitialized"
        })))
        .mount(&server)
        .await;

    let err = client.get_proxy().await.unwrap_err();
    assert_eq!(err.server_message(), Some("Uninitialized"));
}

#[tokio::test]
async fn test_server_error_is_transient_and_empty_body_has_no_message() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/routes/10.0.0.0%2F8"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client.delete_route("10.0.0.0/8").await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.server_message(), None);
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/device"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client.get_device().await.unwrap_err();
    assert!(matches!(err, Error::Deserialization { .. }), "got {err:?}");
}

// ── Event stream ────────────────────────────────────────────────────

#[tokio::test]
async fn test_service_events_passes_token_and_decodes_frames() {
    let (server, client) = setup().await;

    let body = concat!(
        "data: {\"running\":true,\"pid\":1}\n\n",
        ": ping\n\n",
        "data: {\"running\":false}\n\n",
    );

    Mock::given(method("GET"))
        .and(path("/api/v1/service/events"))
        .and(query_param("token", "s3cret"))
        .and(header("Accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let events = client.open_service_events().await.unwrap();
    let msgs: Vec<_> = events.collect().await;
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[0].as_ref().unwrap().data, r#"{"running":true,"pid":1}"#);
    assert_eq!(msgs[1].as_ref().unwrap().data, r#"{"running":false}"#);
}

#[tokio::test]
async fn test_service_events_unauthorized() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/service/events"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthorized" })))
        .mount(&server)
        .await;

    let Err(err) = client.open_service_events().await else {
        panic!("expected unauthorized");
    };
    assert!(err.is_unauthorized());
}
