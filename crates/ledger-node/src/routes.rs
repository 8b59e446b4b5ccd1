use crate::constants::{API_VERSION, SERVICE_NAME};
use crate::service::{LedgerService, ServiceError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{Block, LedgerError, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LedgerService>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    service: &'static str,
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: String,
    data: Option<Value>,
}

impl MessageResponse {
    fn ok(message: impl Into<String>, data: Option<Value>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data,
        })
    }
}

#[derive(Serialize)]
struct ChainResponse {
    chain: Vec<Block>,
    length: usize,
}

#[derive(Deserialize)]
struct TxIn {
    sender: String,
    recipient: String,
    amount: f64,
}

#[derive(Deserialize)]
struct MineRequest {
    miner_address: String,
}

#[derive(Deserialize)]
struct BalanceRequest {
    address: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Ledger(LedgerError::InvalidTransaction(_))
            | ServiceError::Ledger(LedgerError::NothingPending) => StatusCode::BAD_REQUEST,
            ServiceError::Ledger(LedgerError::MiningCanceled { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Ledger(_) | ServiceError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn to_data(value: impl Serialize) -> Option<Value> {
    serde_json::to_value(value).ok()
}

/// Runs a ledger write on the blocking pool. Writers queue behind a running
/// nonce search and must not hold up the async workers serving reads.
async fn run_blocking<T, F>(what: &'static str, f: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("{what} task failed: {e}");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{what} task failed"))
        })?
        .map_err(ApiError::from)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/api", get(api_index))
        .route("/api/chain", get(get_chain))
        .route("/api/chain/validate", get(validate_chain))
        .route("/api/block/{index}", get(get_block))
        .route("/api/transaction", post(create_transaction))
        .route("/api/transactions/pending", get(pending_transactions))
        .route("/api/mine", post(mine_block))
        .route("/api/stats", get(stats))
        .route("/api/balance", post(balance))
        .route("/api/reset", post(reset))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Ledger API",
        "version": API_VERSION,
        "api": "/api",
    }))
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "healthy",
        service: SERVICE_NAME,
    })
}

async fn api_index() -> Json<MessageResponse> {
    MessageResponse::ok(
        "Ledger API is running",
        Some(json!({
            "version": API_VERSION,
            "endpoints": [
                "GET /api/chain",
                "GET /api/chain/validate",
                "GET /api/block/{index}",
                "POST /api/transaction",
                "GET /api/transactions/pending",
                "POST /api/mine",
                "GET /api/stats",
                "POST /api/balance",
                "POST /api/reset",
            ],
        })),
    )
}

async fn get_chain(State(state): State<AppState>) -> Json<ChainResponse> {
    let chain = state.service.chain();
    Json(ChainResponse {
        length: chain.len(),
        chain,
    })
}

async fn validate_chain(State(state): State<AppState>) -> Json<MessageResponse> {
    let report = state.service.validate();
    Json(MessageResponse {
        success: report.valid,
        message: report.message,
        data: Some(json!({
            "total_blocks": report.total_blocks,
            "failed_block": report.failed_block,
        })),
    })
}

async fn get_block(
    State(state): State<AppState>,
    Path(index): Path<i64>,
) -> ApiResult<Json<Block>> {
    state.service.block(index).map(Json).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("Block with index {index} not found"),
        )
    })
}

async fn create_transaction(
    State(state): State<AppState>,
    Json(tx): Json<TxIn>,
) -> ApiResult<Json<MessageResponse>> {
    let service = Arc::clone(&state.service);
    let submitted = run_blocking("submit", move || {
        service.submit(tx.sender, tx.recipient, tx.amount)
    })
    .await?;
    Ok(MessageResponse::ok(
        "Transaction added to pending transactions",
        to_data(submitted),
    ))
}

async fn pending_transactions(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    Json(state.service.pending())
}

async fn mine_block(
    State(state): State<AppState>,
    Json(req): Json<MineRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if req.miner_address.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "miner_address must not be empty",
        ));
    }
    let service = Arc::clone(&state.service);
    let mined = run_blocking("mining", move || service.mine(&req.miner_address)).await?;
    Ok(MessageResponse::ok(
        format!("Block {} mined successfully", mined.block.index()),
        to_data(mined),
    ))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(to_data(state.service.stats()).unwrap_or_default())
}

async fn balance(
    State(state): State<AppState>,
    Json(req): Json<BalanceRequest>,
) -> ApiResult<Json<Value>> {
    if req.address.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "address must not be empty",
        ));
    }
    Ok(Json(to_data(state.service.balance(&req.address)).unwrap_or_default()))
}

async fn reset(State(state): State<AppState>) -> ApiResult<Json<MessageResponse>> {
    let service = Arc::clone(&state.service);
    let persisted = run_blocking("reset", move || service.reset()).await?;
    Ok(MessageResponse::ok(
        "Blockchain reset to genesis block",
        Some(json!({ "persisted": persisted })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerParams;
    use crate::service::tests::{params, UnavailableStore};
    use axum_test::TestServer;
    use ledger_core::{Block, BlockStore};
    use ledger_storage::MemoryStore;
    use std::time::Duration;

    fn server_with(store: Arc<dyn ledger_core::BlockStore>) -> TestServer {
        let service = Arc::new(LedgerService::open(params(), store));
        TestServer::new(router(AppState { service })).expect("test server")
    }

    fn server() -> TestServer {
        server_with(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn health_endpoints() {
        let server = server();
        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let json: Value = response.json();
        assert_eq!(json["status"], "healthy");

        let json: Value = server.get("/api").await.json();
        assert_eq!(json["success"], true);
        assert!(json["data"]["endpoints"].is_array());
    }

    #[tokio::test]
    async fn fresh_chain_has_genesis() {
        let server = server();
        let json: Value = server.get("/api/chain").await.json();
        assert_eq!(json["length"], 1);
        let genesis = &json["chain"][0];
        assert_eq!(genesis["index"], 0);
        assert_eq!(genesis["previous_hash"], "0");
        assert!(genesis["hash"].as_str().unwrap().starts_with('0'));

        let json: Value = server.get("/api/chain/validate").await.json();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["total_blocks"], 1);
    }

    #[tokio::test]
    async fn transaction_mine_balance_flow() {
        let server = server();

        let response = server
            .post("/api/transaction")
            .json(&json!({ "sender": "Alice", "recipient": "Bob", "amount": 50.0 }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let json: Value = response.json();
        assert_eq!(json["data"]["pending_count"], 1);
        assert_eq!(json["data"]["transaction"]["sender"], "Alice");

        let pending: Vec<Value> = server.get("/api/transactions/pending").await.json();
        assert_eq!(pending.len(), 1);

        let response = server
            .post("/api/mine")
            .json(&json!({ "miner_address": "Miner1" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let json: Value = response.json();
        assert_eq!(json["data"]["block"]["index"], 1);
        assert_eq!(json["data"]["reward"], 10.0);
        assert_eq!(json["data"]["persisted"], true);

        let json: Value = server
            .post("/api/balance")
            .json(&json!({ "address": "Bob" }))
            .await
            .json();
        assert_eq!(json["balance"], 50.0);
        assert_eq!(json["transaction_count"], 1);

        let json: Value = server
            .post("/api/balance")
            .json(&json!({ "address": "Alice" }))
            .await
            .json();
        assert_eq!(json["balance"], -50.0);

        let json: Value = server.get("/api/stats").await.json();
        assert_eq!(json["total_blocks"], 2);
        assert_eq!(json["total_transactions"], 2);
        assert_eq!(json["pending_transactions"], 0);
        assert_eq!(json["database_blocks"], 2);

        let json: Value = server.get("/api/block/1").await.json();
        assert_eq!(json["transactions"][1]["sender"], "SYSTEM");
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let server = server();

        let response = server
            .post("/api/transaction")
            .json(&json!({ "sender": "Alice", "recipient": "Bob", "amount": 0.0 }))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        let response = server
            .post("/api/mine")
            .json(&json!({ "miner_address": "Miner1" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let json: Value = response.json();
        assert_eq!(json["detail"], "no pending transactions to mine");

        assert_eq!(
            server.get("/api/block/7").await.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            server.get("/api/block/-1").await.status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn reset_returns_to_genesis() {
        let server = server();
        server
            .post("/api/transaction")
            .json(&json!({ "sender": "Alice", "recipient": "Bob", "amount": 5.0 }))
            .await;
        server
            .post("/api/mine")
            .json(&json!({ "miner_address": "Miner1" }))
            .await;

        let response = server.post("/api/reset").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let json: Value = server.get("/api/chain").await.json();
        assert_eq!(json["length"], 1);
    }

    #[tokio::test]
    async fn reads_answer_while_a_submit_waits_on_mining() {
        // Restored genesis at an unreachable difficulty: the search only ends when canceled.
        let store = Arc::new(MemoryStore::new());
        store.persist_block(&Block::genesis()).unwrap();
        let params = LedgerParams {
            difficulty: 64,
            mining_reward: 1.0,
        };
        let service = Arc::new(LedgerService::open(params, store));
        service.submit("Alice".into(), "Bob".into(), 5.0).unwrap();
        let server = TestServer::new(router(AppState {
            service: Arc::clone(&service),
        }))
        .expect("test server");

        let miner = {
            let service = Arc::clone(&service);
            std::thread::spawn(move || service.mine("Miner1"))
        };
        std::thread::sleep(Duration::from_millis(50));

        let submit = async {
            server
                .post("/api/transaction")
                .json(&json!({ "sender": "Carol", "recipient": "Dave", "amount": 1.0 }))
                .await
        };
        let read = async {
            let response = server.get("/api/stats").await;
            service.cancel_mining();
            response
        };
        let (submitted, stats) = tokio::join!(submit, read);

        assert_eq!(stats.status_code(), StatusCode::OK);
        let json: Value = stats.json();
        assert_eq!(json["total_blocks"], 1);
        assert_eq!(submitted.status_code(), StatusCode::OK);
        assert!(matches!(
            miner.join().unwrap(),
            Err(ServiceError::Ledger(LedgerError::MiningCanceled { .. }))
        ));
        assert_eq!(service.pending().len(), 2);
    }

    #[tokio::test]
    async fn store_outage_is_reported_not_fatal() {
        let server = server_with(Arc::new(UnavailableStore));
        server
            .post("/api/transaction")
            .json(&json!({ "sender": "Alice", "recipient": "Bob", "amount": 5.0 }))
            .await;
        let response = server
            .post("/api/mine")
            .json(&json!({ "miner_address": "Miner1" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let json: Value = response.json();
        assert_eq!(json["data"]["persisted"], false);

        let response = server.post("/api/reset").await;
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
