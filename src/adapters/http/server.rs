//! HTTP Server - Lending API, Chain Hooks and Probes
//!
//! Serves the client-facing lending routes, the chain webhooks, the
//! Prometheus text endpoint and the liveness/readiness probes via
//! axum 0.7. Every failure is rendered as `{ "error", "message" }`
//! with the status mapped from the error taxonomy.

use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tracing::{info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::{
    InstructionHook, LendError, Loan, LoanOffer, Page, RecordId, SettlementOutcome,
};
use crate::ports::marketplace::MetadataFetcher;
use crate::ports::store::Store;
use crate::usecases::{
    AssetHistory, ChainEventHooks, CreateLoanRequest, CreateOfferRequest, InstructionOutcome,
    LoanOfferWorkflow, ScanReport, TransactionPage,
};

const DEFAULT_PAGE_LIMIT: usize = 20;

/// Use cases and probes shared by every route.
pub struct ServerState<S: Store> {
    pub loans: Arc<LoanOfferWorkflow<S, dyn MetadataFetcher>>,
    pub history: Arc<AssetHistory<S>>,
    pub hooks: Arc<ChainEventHooks<S>>,
    pub metrics: Arc<MetricsRegistry>,
    /// Flipped to `false` once shutdown begins.
    pub ready: watch::Receiver<bool>,
}

/// Error body returned by every route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// `LendError` rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(LendError);

impl From<LendError> for ApiError {
    fn from(err: LendError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(LendError::validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(LendError::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(LendError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if !self.0.is_client_error() {
            warn!(error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            error: self.0.error_code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// `?page=&limit=` of the history route.
#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

const fn default_page() -> usize {
    1
}

const fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

/// Instruction hook reply.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstructionReply {
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<InstructionOutcome> for InstructionReply {
    fn from(outcome: InstructionOutcome) -> Self {
        let (outcome, reason) = match outcome {
            InstructionOutcome::Settled(SettlementOutcome::Applied) => ("applied", None),
            InstructionOutcome::Settled(SettlementOutcome::Skipped(reason)) => {
                ("skipped", Some(reason))
            }
            InstructionOutcome::Unparsed => ("unparsed", None),
            InstructionOutcome::Replayed => ("replayed", None),
        };
        Self {
            outcome: outcome.to_string(),
            reason,
        }
    }
}

/// Axum-based HTTP server for the lending API.
pub struct HttpServer<S: Store> {
    state: Arc<ServerState<S>>,
    /// Bind address, e.g. `0.0.0.0:8080`.
    bind: String,
}

impl<S: Store> HttpServer<S> {
    pub fn new(state: ServerState<S>, bind: impl Into<String>) -> Self {
        Self {
            state: Arc::new(state),
            bind: bind.into(),
        }
    }

    /// Build the route table.
    pub fn router(state: Arc<ServerState<S>>) -> Router {
        Router::new()
            .route("/live", get(liveness))
            .route("/ready", get(readiness::<S>))
            .route("/metrics", get(metrics::<S>))
            .route("/loans", post(create_loan::<S>))
            .route("/loans/:loan_id/offers", post(create_offer::<S>))
            .route("/assets/:asset_id/transactions", get(asset_transactions::<S>))
            .route("/hooks/:network/blocks/:block", post(block_hook::<S>))
            .route("/hooks/:network/instructions", post(instruction_hook::<S>))
            .with_state(state)
    }

    /// Bind and serve until shutdown is broadcast.
    #[instrument(skip(self, shutdown_rx), fields(bind = %self.bind))]
    pub async fn run(self, shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.bind).await?;
        info!(address = %listener.local_addr()?, "HTTP server started");
        serve(listener, Self::router(self.state), shutdown_rx).await
    }
}

/// Serve `router` on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;
    Ok(())
}

/// Liveness probe: 200 while the process runs.
async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness probe: 503 once shutdown has begun.
async fn readiness<S: Store>(State(state): State<Arc<ServerState<S>>>) -> impl IntoResponse {
    if *state.ready.borrow() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics<S: Store>(State(state): State<Arc<ServerState<S>>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn create_loan<S: Store>(
    State(state): State<Arc<ServerState<S>>>,
    payload: Result<Json<CreateLoanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Loan>), ApiError> {
    let Json(request) = payload?;
    let loan = state.loans.create_loan(request).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

async fn create_offer<S: Store>(
    State(state): State<Arc<ServerState<S>>>,
    loan_id: Result<Path<RecordId>, PathRejection>,
    payload: Result<Json<CreateOfferRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LoanOffer>), ApiError> {
    let Path(loan_id) = loan_id?;
    let Json(request) = payload?;
    let offer = state.loans.create_loan_offer(loan_id, request).await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

async fn asset_transactions<S: Store>(
    State(state): State<Arc<ServerState<S>>>,
    asset_id: Result<Path<RecordId>, PathRejection>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<TransactionPage>, ApiError> {
    let Path(asset_id) = asset_id?;
    let Query(query) = query?;
    let page = state
        .history
        .list(asset_id, Page::new(query.page.max(1), query.limit))
        .await?;
    Ok(Json(page))
}

async fn block_hook<S: Store>(
    State(state): State<Arc<ServerState<S>>>,
    path: Result<Path<(String, u64)>, PathRejection>,
) -> Result<Json<ScanReport>, ApiError> {
    let Path((network, block)) = path?;
    let report = state.hooks.scan_block(&network, block).await?;
    Ok(Json(report))
}

async fn instruction_hook<S: Store>(
    State(state): State<Arc<ServerState<S>>>,
    network: Result<Path<String>, PathRejection>,
    payload: Result<Json<InstructionHook>, JsonRejection>,
) -> Result<Json<InstructionReply>, ApiError> {
    let Path(network) = network?;
    let Json(hook) = payload?;
    let outcome = state.hooks.on_instruction(&network, hook).await?;
    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::adapters::persistence::MemoryStore;
    use crate::domain::{LendResult, TokenMetadata};
    use crate::ports::chain_client::ChainRegistry;
    use crate::adapters::chain::SolanaChainClient;
    use crate::usecases::{CrawlScheduler, IngestionSink, SettlementApplier};

    struct NoMetadata;

    #[async_trait]
    impl MetadataFetcher for NoMetadata {
        async fn fetch_metadata(&self, uri: &str) -> LendResult<TokenMetadata> {
            Err(LendError::external(format!("unreachable: {uri}")))
        }
    }

    struct Harness {
        base: String,
        ready_tx: watch::Sender<bool>,
        shutdown_tx: broadcast::Sender<()>,
    }

    async fn start() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let chains = ChainRegistry::new().with_client(Arc::new(SolanaChainClient::new()));
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let sink = Arc::new(IngestionSink::new(Arc::clone(&store)));
        let crawler = Arc::new(CrawlScheduler::new(Arc::clone(&store), Vec::new(), sink));
        let settlements = Arc::new(SettlementApplier::new(Arc::clone(&store)));
        let metadata: Arc<dyn MetadataFetcher> = Arc::new(NoMetadata);
        let (ready_tx, ready) = watch::channel(true);

        let state = Arc::new(ServerState {
            loans: Arc::new(LoanOfferWorkflow::new(
                Arc::clone(&store),
                metadata,
                chains.clone(),
            )),
            history: Arc::new(AssetHistory::new(Arc::clone(&store), crawler)),
            hooks: Arc::new(ChainEventHooks::new(Arc::clone(&store), chains, settlements)),
            metrics,
            ready,
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(serve(listener, HttpServer::router(state), shutdown_rx));

        Harness {
            base: format!("http://{addr}"),
            ready_tx,
            shutdown_tx,
        }
    }

    #[tokio::test]
    async fn test_probes_follow_shutdown() {
        let h = start().await;
        let http = reqwest::Client::new();

        let live = http.get(format!("{}/live", h.base)).send().await.unwrap();
        assert_eq!(live.status(), 200);
        let ready = http.get(format!("{}/ready", h.base)).send().await.unwrap();
        assert_eq!(ready.status(), 200);

        h.ready_tx.send(false).unwrap();
        let ready = http.get(format!("{}/ready", h.base)).send().await.unwrap();
        assert_eq!(ready.status(), 503);

        let metrics = http.get(format!("{}/metrics", h.base)).send().await.unwrap();
        assert_eq!(metrics.status(), 200);
        assert!(metrics.text().await.unwrap().contains("nftlend_feed_reconnects_total"));
        let _ = h.shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_errors_use_json_body() {
        let h = start().await;
        let http = reqwest::Client::new();

        let resp = http
            .post(format!("{}/loans", h.base))
            .json(&json!({
                "network": "SOL",
                "principal_amount": "10",
                "currency_id": 1,
                "duration": 86400,
                "borrower": "Borrower1111",
                "contract_address": "Mint1111",
                "token_id": "1",
                "nonce": "0x01",
                "signature": "0x00"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.error, "validation_error");

        let resp = http
            .post(format!("{}/loans", h.base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = http
            .get(format!("{}/assets/42/transactions?page=1&limit=5", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.error, "not_found");

        let resp = http
            .post(format!("{}/hooks/DOGE/blocks/7", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let _ = h.shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_instruction_hook_replies_outcome() {
        let h = start().await;
        let http = reqwest::Client::new();
        let hook = json!({
            "block_number": 120,
            "block_time": 1_646_128_800,
            "transaction_hash": "5xSig",
            "instruction_index": 0,
            "instruction": "cancel_loan",
            "data": { "borrower": "Borrower1111", "nonce": "0x01" }
        });

        let url = format!("{}/hooks/SOL/instructions", h.base);
        let first: InstructionReply = http.post(&url).json(&hook).send().await.unwrap().json().await.unwrap();
        assert_eq!(first.outcome, "skipped");
        let second: InstructionReply = http.post(&url).json(&hook).send().await.unwrap().json().await.unwrap();
        assert_eq!(second.outcome, "replayed");

        let block = http
            .post(format!("{}/hooks/SOL/blocks/130", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(block.status(), 200);
        let report: serde_json::Value = block.json().await.unwrap();
        assert_eq!(report["cursor"], 130);
        let _ = h.shutdown_tx.send(());
    }
}
