//! Admin API integration tests over a real listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use endpoint_monitor::admin::{serve_admin, AdminState};
use endpoint_monitor::config::MonitorConfig;
use endpoint_monitor::health::EndpointMonitor;
use endpoint_monitor::Shutdown;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

mod common;
use common::ScriptedTransport;

const KEY: &str = "test-admin-key";

struct Harness {
    addr: SocketAddr,
    monitor: EndpointMonitor,
    client: reqwest::Client,
    shutdown: Shutdown,
}

impl Harness {
    async fn start() -> Self {
        let monitor = EndpointMonitor::builder(Arc::new(ScriptedTransport::new()))
            .build()
            .unwrap();

        let mut config = MonitorConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = KEY.to_string();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let state = AdminState {
            monitor: monitor.clone(),
            config: Arc::new(ArcSwap::from_pointee(config)),
        };
        tokio::spawn(serve_admin(listener, state, shutdown.subscribe()));

        Self {
            addr,
            monitor,
            client: reqwest::Client::new(),
            shutdown,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(KEY)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, body: Option<Value>) -> reqwest::Response {
        let mut request = self.client.post(self.url(path)).bearer_auth(KEY);
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.unwrap()
    }
}

#[tokio::test]
async fn test_rejects_missing_or_wrong_key() {
    let harness = Harness::start().await;

    let res = harness
        .client
        .get(harness.url("/admin/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = harness
        .client
        .get(harness.url("/admin/status"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    harness.shutdown.trigger();
}

#[tokio::test]
async fn test_status_reports_pause() {
    let harness = Harness::start().await;

    let status: Value = harness.get("/admin/status").await.json().await.unwrap();
    assert_eq!(status["paused"], false);
    assert_eq!(status["status"], "operational");
    assert_eq!(status["monitored_endpoints"], 0);

    let paused: Value = harness.post("/admin/pause", None).await.json().await.unwrap();
    assert_eq!(paused["paused"], true);
    assert!(harness.monitor.is_paused());

    let resumed: Value = harness.post("/admin/resume", None).await.json().await.unwrap();
    assert_eq!(resumed["paused"], false);
    assert!(!harness.monitor.is_paused());

    harness.shutdown.trigger();
}

#[tokio::test]
async fn test_start_health_and_stop_endpoint() {
    let harness = Harness::start().await;
    let endpoint = "http://10.0.0.5:11434";

    let ack: Value = harness
        .post(
            "/admin/endpoints",
            Some(json!({ "endpoint": endpoint, "new": true, "deferred": true })),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ack["references"], 1);

    let listing: Value = harness.get("/admin/endpoints").await.json().await.unwrap();
    assert_eq!(listing[0]["endpoint"], endpoint);
    assert_eq!(listing[0]["phase"], "deferred");

    let res = harness
        .client
        .get(harness.url("/admin/health"))
        .query(&[("endpoint", endpoint)])
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let health: Value = res.json().await.unwrap();
    assert_eq!(health["connected"], false);
    assert_eq!(health["in_grace_period"], true);

    let res = harness
        .client
        .delete(harness.url("/admin/endpoints"))
        .query(&[("endpoint", endpoint)])
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    let ack: Value = res.json().await.unwrap();
    assert_eq!(ack["references"], 0);
    assert!(harness.monitor.get_health(endpoint).is_none());

    harness.shutdown.trigger();
}

#[tokio::test]
async fn test_health_of_unknown_endpoint_is_404() {
    let harness = Harness::start().await;

    let res = harness
        .client
        .get(harness.url("/admin/health"))
        .query(&[("endpoint", "http://nowhere")])
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    harness.shutdown.trigger();
}

#[tokio::test]
async fn test_start_rejects_empty_endpoint() {
    let harness = Harness::start().await;

    let res = harness
        .post("/admin/endpoints", Some(json!({ "endpoint": "" })))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    harness.shutdown.trigger();
}

#[tokio::test]
async fn test_listing_shows_probe_results() {
    let harness = Harness::start().await;
    harness
        .post("/admin/endpoints", Some(json!({ "endpoint": "http://a" })))
        .await;

    let mut connected = Value::Null;
    for _ in 0..50 {
        let listing: Value = harness.get("/admin/endpoints").await.json().await.unwrap();
        connected = listing[0]["health"]["connected"].clone();
        if connected == true {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(connected, true);

    harness.shutdown.trigger();
}
