//! HTTP server: bridge API, health and metrics endpoints
//!
//! Bridge routes live under [`API_PREFIX`]:
//! - `GET  is_tx_processed/{identifier}`
//! - `GET  processed_deposits?start_after=&limit=`
//! - `GET  deposit/{index}`
//! - `GET  deposit_identifier/{index}`
//! - `GET  eth_block_height`, `POST eth_block_height`
//! - `GET  balance/{address}?denom=`
//! - `POST process_deposit`, `POST process_deposit_event`
//!
//! Errors are returned as `{ "code": u32, "error": string }`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use cosmwasm_std::{from_json, Response as LedgerResponse};
use eyre::eyre;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use bridge::error::BridgeError;
use bridge::msg::{
    BalanceResponse, DepositIdentifierResponse, DepositIndexStatusResponse,
    EthBlockHeightResponse, ExecuteMsg, IsTxProcessedResponse, ProcessDepositResponse,
    ProcessedDepositsResponse, QueryMsg,
};

use crate::app::BridgeApp;

/// Path prefix of the bridge API
pub const API_PREFIX: &str = "/b52/bridge/v1";

// ============================================================================
// Metrics
// ============================================================================

/// Prometheus metrics
pub struct Metrics {
    pub deposits_processed_total: IntCounter,
    /// Rejected transitions by error kind
    pub deposits_rejected_total: IntCounterVec,
    pub duplicates_total: IntCounter,
    pub source_errors_total: IntCounter,
    /// Pinned source block height (0 = follow latest)
    pub eth_block_height: IntGauge,
    pub registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let deposits_processed_total = IntCounter::new(
            "b52_bridge_deposits_processed_total",
            "Total number of deposits minted",
        )
        .expect("constant metric name is valid");

        let deposits_rejected_total = IntCounterVec::new(
            Opts::new(
                "b52_bridge_deposits_rejected_total",
                "Total number of rejected deposit transitions by error kind",
            ),
            &["kind"],
        )
        .expect("constant metric name is valid");

        let duplicates_total = IntCounter::new(
            "b52_bridge_duplicate_deposits_total",
            "Total number of submissions rejected as already processed",
        )
        .expect("constant metric name is valid");

        let source_errors_total = IntCounter::new(
            "b52_bridge_source_errors_total",
            "Total number of source-chain failures and timeouts",
        )
        .expect("constant metric name is valid");

        let eth_block_height = IntGauge::new(
            "b52_bridge_pinned_eth_block_height",
            "Source block height pinned by the authority",
        )
        .expect("constant metric name is valid");

        registry
            .register(Box::new(deposits_processed_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(deposits_rejected_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(duplicates_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(source_errors_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(eth_block_height.clone()))
            .expect("metric registration must not be called twice");

        Self {
            deposits_processed_total,
            deposits_rejected_total,
            duplicates_total,
            source_errors_total,
            eth_block_height,
            registry,
        }
    }

    fn set_eth_block_height(&self, height: u64) {
        self.eth_block_height
            .set(i64::try_from(height).unwrap_or(i64::MAX));
    }

    fn record_rejection(&self, err: &BridgeError) {
        self.deposits_rejected_total
            .with_label_values(&[err.kind()])
            .inc();
        match err {
            BridgeError::AlreadyProcessed { .. } => self.duplicates_total.inc(),
            BridgeError::SourceUnavailable { .. } => self.source_errors_total.inc(),
            _ => {}
        }
    }
}

pub type SharedMetrics = Arc<Metrics>;

/// Combined app state
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<BridgeApp>,
    pub metrics: SharedMetrics,
    pub started_at: Instant,
}

impl AppState {
    /// Wrap `app`, seeding the gauges from its current state.
    pub async fn new(app: Arc<BridgeApp>) -> Self {
        let metrics = Metrics::new();
        match app
            .query::<EthBlockHeightResponse>(QueryMsg::EthBlockHeight {})
            .await
        {
            Ok(res) => metrics.set_eth_block_height(res.eth_block_height),
            Err(e) => warn!(error = %e, "Failed to read pinned source block height"),
        }

        Self {
            app,
            metrics: Arc::new(metrics),
            started_at: Instant::now(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// JSON error body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: u32,
    pub error: String,
}

/// A bridge error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

/// HTTP status for each error kind.
pub fn status_for(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::InvalidRequest { .. }
        | BridgeError::InvalidDeposit { .. }
        | BridgeError::MalformedCalldata { .. }
        | BridgeError::MalformedEventData { .. } => StatusCode::BAD_REQUEST,
        BridgeError::Unauthorized => StatusCode::FORBIDDEN,
        BridgeError::NotFound { .. } => StatusCode::NOT_FOUND,
        BridgeError::AlreadyProcessed { .. } => StatusCode::CONFLICT,
        BridgeError::InvalidResponse { .. } => StatusCode::BAD_GATEWAY,
        BridgeError::SourceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::MintFailure { .. } | BridgeError::Std(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        Self {
            status: status_for(&err),
            body: ErrorBody {
                code: err.code(),
                error: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Bridge Routes
// ============================================================================

/// Body of `POST process_deposit`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDepositRequest {
    pub creator: String,
    pub deposit_index: u64,
    #[serde(default)]
    pub eth_block_height: Option<u64>,
}

/// Body of `POST process_deposit_event`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDepositEventRequest {
    pub creator: String,
    pub deposit_index: u64,
    pub from_block: u64,
    pub to_block: u64,
}

/// Body of `POST eth_block_height`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEthBlockHeightRequest {
    pub authority: String,
    pub eth_block_height: u64,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    start_after: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DenomParams {
    denom: Option<String>,
}

async fn is_tx_processed(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> ApiResult<IsTxProcessedResponse> {
    Ok(Json(
        state
            .app
            .query(QueryMsg::IsTxProcessed { identifier })
            .await?,
    ))
}

async fn processed_deposits(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<ProcessedDepositsResponse> {
    let msg = QueryMsg::ProcessedDeposits {
        start_after: params.start_after,
        limit: params.limit,
    };
    Ok(Json(state.app.query(msg).await?))
}

async fn deposit_status(
    State(state): State<AppState>,
    Path(deposit_index): Path<u64>,
) -> ApiResult<DepositIndexStatusResponse> {
    Ok(Json(
        state
            .app
            .query(QueryMsg::DepositIndexStatus { deposit_index })
            .await?,
    ))
}

async fn deposit_identifier(
    State(state): State<AppState>,
    Path(deposit_index): Path<u64>,
) -> ApiResult<DepositIdentifierResponse> {
    Ok(Json(
        state
            .app
            .query(QueryMsg::DepositIdentifier { deposit_index })
            .await?,
    ))
}

async fn balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<DenomParams>,
) -> ApiResult<BalanceResponse> {
    let msg = QueryMsg::Balance {
        address,
        denom: params.denom,
    };
    Ok(Json(state.app.query(msg).await?))
}

async fn eth_block_height(State(state): State<AppState>) -> ApiResult<EthBlockHeightResponse> {
    Ok(Json(state.app.query(QueryMsg::EthBlockHeight {}).await?))
}

async fn update_eth_block_height(
    State(state): State<AppState>,
    Json(req): Json<UpdateEthBlockHeightRequest>,
) -> ApiResult<EthBlockHeightResponse> {
    let msg = ExecuteMsg::UpdateEthBlockHeight {
        authority: req.authority,
        eth_block_height: req.eth_block_height,
    };
    state.app.execute(msg).await?;
    state.metrics.set_eth_block_height(req.eth_block_height);
    info!(eth_block_height = req.eth_block_height, "Pinned source block height");
    Ok(Json(EthBlockHeightResponse {
        eth_block_height: req.eth_block_height,
    }))
}

async fn process_deposit(
    State(state): State<AppState>,
    Json(req): Json<ProcessDepositRequest>,
) -> ApiResult<ProcessDepositResponse> {
    let msg = ExecuteMsg::ProcessDeposit {
        creator: req.creator,
        deposit_index: req.deposit_index,
        eth_block_height: req.eth_block_height,
    };
    run_deposit(&state, req.deposit_index, msg).await
}

async fn process_deposit_event(
    State(state): State<AppState>,
    Json(req): Json<ProcessDepositEventRequest>,
) -> ApiResult<ProcessDepositResponse> {
    let msg = ExecuteMsg::ProcessDepositEvent {
        creator: req.creator,
        deposit_index: req.deposit_index,
        from_block: req.from_block,
        to_block: req.to_block,
    };
    run_deposit(&state, req.deposit_index, msg).await
}

async fn run_deposit(
    state: &AppState,
    deposit_index: u64,
    msg: ExecuteMsg,
) -> ApiResult<ProcessDepositResponse> {
    match state.app.execute(msg).await {
        Ok(response) => {
            state.metrics.deposits_processed_total.inc();
            Ok(Json(deposit_response(response)?))
        }
        Err(e) => {
            warn!(deposit_index, code = e.code(), error = %e, "Deposit rejected");
            state.metrics.record_rejection(&e);
            Err(e.into())
        }
    }
}

fn deposit_response(response: LedgerResponse) -> Result<ProcessDepositResponse, BridgeError> {
    let data = response.data.ok_or_else(|| BridgeError::InvalidResponse {
        reason: "deposit transition returned no data".to_string(),
    })?;
    Ok(from_json(&data)?)
}

// ============================================================================
// Health & Metrics
// ============================================================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub deposits_processed: u64,
    pub eth_block_height: u64,
    pub uptime_seconds: u64,
}

async fn health_check(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    let height: EthBlockHeightResponse = state.app.query(QueryMsg::EthBlockHeight {}).await?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        deposits_processed: state.metrics.deposits_processed_total.get(),
        eth_block_height: height.eth_block_height,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

/// Liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Readiness check (source chain reachable)
async fn readiness(State(state): State<AppState>) -> Response {
    if state.app.source_reachable().await {
        "OK".into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY").into_response()
    }
}

/// Prometheus metrics endpoint
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
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

// ============================================================================
// Server
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/is_tx_processed/{identifier}", get(is_tx_processed))
        .route("/processed_deposits", get(processed_deposits))
        .route("/deposit/{index}", get(deposit_status))
        .route("/deposit_identifier/{index}", get(deposit_identifier))
        .route(
            "/eth_block_height",
            get(eth_block_height).post(update_eth_block_height),
        )
        .route("/balance/{address}", get(balance))
        .route("/process_deposit", axum::routing::post(process_deposit))
        .route(
            "/process_deposit_event",
            axum::routing::post(process_deposit_event),
        );

    Router::new()
        .nest(API_PREFIX, api)
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> eyre::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Bind and start the HTTP server
pub async fn start_server<F>(
    bind_address: &str,
    port: u16,
    state: AppState,
    shutdown: F,
) -> eyre::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("Bridge API listening on {}", addr);
    info!("  {}/... - Bridge queries and transactions", API_PREFIX);
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
        assert_eq!(
            status_for(&BridgeError::AlreadyProcessed {
                identifier: "x".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&BridgeError::SourceUnavailable { reason: "x".into() }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&BridgeError::InvalidDeposit { reason: "x".into() }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&BridgeError::Unauthorized),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_height_gauge_seeded_from_ledger() {
        use std::time::Duration;

        use bridge::msg::InstantiateMsg;
        use bridge::testing::{MockSourceChain, TEST_AUTHORITY, TEST_DEPOSIT_CONTRACT};

        let app = BridgeApp::new(
            Arc::new(MockSourceChain::new(100)),
            Duration::from_secs(1),
            InstantiateMsg {
                authority: TEST_AUTHORITY.to_string(),
                deposit_contract: TEST_DEPOSIT_CONTRACT.to_string(),
                denom: None,
                module_account: None,
                address_prefix: None,
            },
        )
        .unwrap();
        app.execute(ExecuteMsg::UpdateEthBlockHeight {
            authority: TEST_AUTHORITY.to_string(),
            eth_block_height: 77,
        })
        .await
        .unwrap();

        let state = AppState::new(Arc::new(app)).await;
        assert_eq!(state.metrics.eth_block_height.get(), 77);
    }

    #[test]
    fn test_rejections_are_counted_by_kind() {
        let metrics = Metrics::new();
        metrics.record_rejection(&BridgeError::AlreadyProcessed {
            identifier: "x".into(),
        });
        metrics.record_rejection(&BridgeError::SourceUnavailable { reason: "x".into() });
        metrics.record_rejection(&BridgeError::InvalidDeposit { reason: "x".into() });

        assert_eq!(metrics.duplicates_total.get(), 1);
        assert_eq!(metrics.source_errors_total.get(), 1);
        assert_eq!(
            metrics
                .deposits_rejected_total
                .with_label_values(&["invalid_deposit"])
                .get(),
            1
        );
    }
}
