//! HTTP API tests over a real listener

mod common;

use std::sync::Arc;

use common::*;
use faucet::balances::FundingReport;
use faucet::server::{self, AppState, ServiceStatus, SharedStatus};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, RwLock};
use tokio_test::assert_ok;

struct TestServer {
    base: String,
    status: SharedStatus,
    client: reqwest::Client,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    async fn start(h: &Harness) -> Self {
        let status: SharedStatus = Arc::new(RwLock::new(ServiceStatus::default()));
        let state = AppState {
            dispatcher: h.dispatcher.clone(),
            status: status.clone(),
            metrics: h.metrics.clone(),
        };

        let listener = assert_ok!(TcpListener::bind("127.0.0.1:0").await);
        let addr = assert_ok!(listener.local_addr());
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server::serve(listener, state, async move {
            let _ = rx.await;
        }));

        Self {
            base: format!("http://{}", addr),
            status,
            client: reqwest::Client::new(),
            _shutdown: tx,
        }
    }

    async fn distribute(&self, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}/api/distribute", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_distribute_then_rate_limited() {
    let h = Harness::new(default_assets());
    h.fund_operator();
    let srv = TestServer::start(&h).await;

    let (status, body) = srv.distribute(json!({ "address": RECIPIENT_B })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["environment"], "ledgerB");
    assert_eq!(body["transfers"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["transfers"][0]["asset"], "DUAL");
    assert_eq!(body["transfers"][0]["amount"], "5");
    assert!(body["correlationId"].as_str().is_some_and(|s| !s.is_empty()));
    assert!(body.get("errorKind").is_none());

    let (status, body) = srv.distribute(json!({ "address": RECIPIENT_A })).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);
    assert_eq!(body["errorKind"], "rateLimited");
    assert!(body["retryAfterSecs"].as_u64().is_some_and(|s| s > 0));
}

#[tokio::test]
async fn test_distribute_rejects_bad_input() {
    let h = Harness::new(default_assets());
    let srv = TestServer::start(&h).await;

    let (status, body) = srv.distribute(json!({ "address": "0xnothex" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorKind"], "invalidAddress");

    let (status, _) = srv
        .distribute(json!({ "address": RECIPIENT_B, "amount": "1000" }))
        .await;
    assert!(status.is_client_error());
    assert_eq!(h.chain.queries(), 0);
}

#[tokio::test]
async fn test_reverted_distribution_maps_to_bad_gateway() {
    let h = Harness::new(default_assets());
    // Operator holds nothing on Ledger-B, so the attached value cannot be paid
    let srv = TestServer::start(&h).await;

    let (status, body) = srv.distribute(json!({ "address": RECIPIENT_B })).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["errorKind"], "contractReverted");
    assert_eq!(body["asset"], "DUAL");
    assert!(body["txReference"].as_str().is_some());
}

#[tokio::test]
async fn test_assets_listing() {
    let h = Harness::new(default_assets());
    let srv = TestServer::start(&h).await;

    let resp = srv.get("/api/assets").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body[0]["symbol"], "DUAL");
    assert_eq!(body[0]["ledgerADenom"], "udual");
    assert_eq!(body[0]["ledgerB"], json!({ "kind": "native" }));
    assert_eq!(body[0]["targetBalance"], "5");
    assert_eq!(body[1]["symbol"], "USDC");
    assert_eq!(body[1]["ledgerB"]["kind"], "erc20");
    assert_eq!(body[1]["amountPerRequest"], "10");
}

#[tokio::test]
async fn test_limits_follow_distributions() {
    let h = Harness::new(default_assets());
    h.fund_operator();
    let srv = TestServer::start(&h).await;

    let before: Value = srv
        .get(&format!("/api/limits/{}", RECIPIENT_A))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(before["allowed"], true);
    assert_eq!(before["retryAfterSecs"], 0);
    assert_eq!(before["quota"], 1);
    assert_eq!(before["windowSecs"], 12 * 60 * 60);

    srv.distribute(json!({ "address": RECIPIENT_A })).await;

    // Same account seen through the other encoding
    let after: Value = srv
        .get(&format!("/api/limits/{}", RECIPIENT_B))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(after["allowed"], false);
    assert_eq!(after["environment"], "ledgerB");
    assert!(after["retryAfterSecs"].as_u64().is_some_and(|s| s > 0));

    let resp = srv.get("/api/limits/garbage").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_endpoints_and_metrics() {
    let h = Harness::new(default_assets());
    let srv = TestServer::start(&h).await;

    let resp = srv.get("/healthz").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "OK");

    let resp = srv.get("/readyz").await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.text().await.unwrap(), "NOT_READY");

    srv.status.write().await.funding = Some(FundingReport {
        ready: true,
        shortfalls: vec![],
        checked_at: chrono::Utc::now(),
    });
    assert_eq!(srv.get("/readyz").await.status(), StatusCode::OK);

    let health: Value = srv.get("/health").await.json().await.unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["ready"], true);
    assert_eq!(
        health["ledgerBAddress"],
        "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
    );
    assert_eq!(
        health["ledgerAAddress"],
        "evmos17w0adeg64ky0daxwd2ugyuneellmjgnxpu2u3g"
    );
    assert_eq!(health["assets"], 2);

    srv.distribute(json!({ "address": "nope" })).await;
    let text = srv.get("/metrics").await.text().await.unwrap();
    assert!(text.contains("faucet_distributions_total"));
    assert!(text.contains("faucet_failures_total{kind=\"invalid_address\"} 1"));
}
