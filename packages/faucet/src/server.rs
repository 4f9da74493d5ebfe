//! HTTP server: distribution API, health, readiness and metrics endpoints

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use eyre::eyre;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;

use crate::balances::FundingReport;
use crate::dispatcher::{DistributionResult, Dispatcher};
use crate::error::ErrorKind;
use crate::metrics::Metrics;
use dualchain_rs::{Environment, LedgerBAsset};

/// Service status shared between the readiness task and the HTTP server
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub started_at: Instant,
    /// Latest operator funding check
    pub funding: Option<FundingReport>,
    /// Error of the latest funding check, if it failed
    pub funding_error: Option<String>,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            funding: None,
            funding_error: None,
        }
    }
}

impl ServiceStatus {
    pub fn is_ready(&self) -> bool {
        self.funding_error.is_none() && self.funding.as_ref().is_some_and(|f| f.ready)
    }
}

pub type SharedStatus = Arc<RwLock<ServiceStatus>>;
pub type SharedMetrics = Arc<Metrics>;

/// Combined app state
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub status: SharedStatus,
    pub metrics: SharedMetrics,
}

// ============================================================================
// Distribution API
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributeRequest {
    pub address: String,
}

/// HTTP status for a distribution outcome
pub fn status_for(kind: Option<ErrorKind>) -> StatusCode {
    match kind {
        None => StatusCode::OK,
        Some(ErrorKind::InvalidAddress) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
        Some(ErrorKind::BalanceQueryError) => StatusCode::SERVICE_UNAVAILABLE,
        Some(ErrorKind::InsufficientOperatorFunds) => StatusCode::SERVICE_UNAVAILABLE,
        Some(ErrorKind::ChainSubmissionError) => StatusCode::BAD_GATEWAY,
        Some(ErrorKind::ContractReverted) => StatusCode::BAD_GATEWAY,
        Some(ErrorKind::Timeout) => StatusCode::GATEWAY_TIMEOUT,
    }
}

async fn distribute(
    State(state): State<AppState>,
    Json(body): Json<DistributeRequest>,
) -> (StatusCode, Json<DistributionResult>) {
    let result = state.dispatcher.distribute(&body.address).await;
    (status_for(result.error_kind), Json(result))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetView {
    pub symbol: String,
    pub decimals: u8,
    pub ledger_a_denom: String,
    pub ledger_b: LedgerBAsset,
    pub amount_per_request: String,
    pub target_balance: String,
}

async fn list_assets(State(state): State<AppState>) -> Json<Vec<AssetView>> {
    let assets = state
        .dispatcher
        .assets()
        .iter()
        .map(|a| AssetView {
            symbol: a.symbol.clone(),
            decimals: a.decimals,
            ledger_a_denom: a.ledger_a_denom.clone(),
            ledger_b: a.ledger_b,
            amount_per_request: a.display_amount_per_request(),
            target_balance: a.display_target(),
        })
        .collect();
    Json(assets)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitView {
    pub address: String,
    pub environment: Environment,
    pub allowed: bool,
    pub retry_after_secs: u64,
    pub window_secs: u64,
    pub quota: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_kind: ErrorKind,
    message: String,
}

async fn limits(State(state): State<AppState>, Path(address): Path<String>) -> Response {
    match state.dispatcher.next_admission(&address) {
        Ok((addr, wait)) => {
            let limiter = state.dispatcher.limiter();
            Json(LimitView {
                address: addr.recipient(),
                environment: addr.environment(),
                allowed: wait.is_zero(),
                retry_after_secs: wait.as_secs(),
                window_secs: limiter.window().as_secs(),
                quota: limiter.quota(),
            })
            .into_response()
        }
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error_kind: ErrorKind::InvalidAddress,
                message: err.to_string(),
            }),
        )
            .into_response(),
    }
}

// ============================================================================
// Health & Metrics
// ============================================================================

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub ready: bool,
    pub ledger_a_address: String,
    pub ledger_b_address: String,
    pub uptime_secs: u64,
    pub assets: usize,
    pub tracked_addresses: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding: Option<FundingReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_error: Option<String>,
}

/// Health check endpoint handler
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.status.read().await;
    let session = state.dispatcher.session();
    Json(HealthResponse {
        status: "healthy".to_string(),
        ready: status.is_ready(),
        ledger_a_address: session.address_in(Environment::LedgerA),
        ledger_b_address: session.address_in(Environment::LedgerB),
        uptime_secs: status.started_at.elapsed().as_secs(),
        assets: state.dispatcher.assets().len(),
        tracked_addresses: state.dispatcher.limiter().tracked(),
        funding: status.funding.clone(),
        funding_error: status.funding_error.clone(),
    })
}

/// Liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Readiness check (operator funded on both environments)
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.status.read().await.is_ready() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    }
}

/// Prometheus metrics endpoint
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    state
        .metrics
        .rate_limited_addresses
        .set(state.dispatcher.limiter().tracked() as i64);

    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

/// All routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/distribute", post(distribute))
        .route("/api/assets", get(list_assets))
        .route("/api/limits/{address}", get(limits))
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> eyre::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Start the HTTP server
pub async fn start_server(
    bind_address: &str,
    port: u16,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> eyre::Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("Faucet server listening on {}", addr);
    info!("  POST /api/distribute - Request a top-up");
    info!("  /health  - Full health status (JSON)");
    info!("  /metrics - Prometheus metrics");

    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(None), StatusCode::OK);
        assert_eq!(status_for(Some(ErrorKind::InvalidAddress)), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(Some(ErrorKind::RateLimited)), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(Some(ErrorKind::Timeout)), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(Some(ErrorKind::ContractReverted)), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(Some(ErrorKind::InsufficientOperatorFunds)),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_readiness_requires_funded_report() {
        let mut status = ServiceStatus::default();
        assert!(!status.is_ready());

        status.funding = Some(FundingReport {
            ready: true,
            shortfalls: vec![],
            checked_at: chrono::Utc::now(),
        });
        assert!(status.is_ready());

        status.funding_error = Some("connection refused".to_string());
        assert!(!status.is_ready());
    }
}
