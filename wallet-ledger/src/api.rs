//! HTTP surface of the wallet service
//!
//! Every mutation endpoint takes a JSON body carrying a shared `token`. The
//! handlers only check the token and decode the body; all business rules live
//! in [`LedgerStore`].

use crate::{
    ledger::LedgerStore,
    metrics::Metrics,
    types::{AccountId, AccountSnapshot, DepositId, TransactionId, TransactionKind},
    Error,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Ledger store
    pub store: Arc<LedgerStore>,
    /// Metrics collector
    pub metrics: Metrics,
    /// Expected request token
    pub api_token: Arc<str>,
    /// Service name reported by `/health`
    pub service_name: Arc<str>,
}

impl AppState {
    /// Create handler state
    pub fn new(store: Arc<LedgerStore>, metrics: Metrics, api_token: &str, service_name: &str) -> Self {
        Self {
            store,
            metrics,
            api_token: Arc::from(api_token),
            service_name: Arc::from(service_name),
        }
    }

    fn authorize(&self, token: &str) -> Result<(), ApiError> {
        if token.is_empty() {
            return Err(ApiError::Unauthorized("missing token".to_string()));
        }
        if token != &*self.api_token {
            return Err(ApiError::Unauthorized("token not correct".to_string()));
        }
        Ok(())
    }
}

/// Request-level errors
#[derive(Debug)]
pub enum ApiError {
    /// Token missing or wrong
    Unauthorized(String),
    /// Body decoded but not acceptable
    BadRequest(String),
    /// Rejected by the ledger
    Ledger(Error),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(err) => match err {
                Error::AccountNotFound(_) => StatusCode::NOT_FOUND,
                Error::DuplicateAccount(_)
                | Error::DuplicateDeposit { .. }
                | Error::DuplicateTransaction { .. } => StatusCode::CONFLICT,
                Error::InsufficientFunds { .. } | Error::AmountOverflow { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthorized(msg) | ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Ledger(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}

/// `{"error": ...}` body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Empty on success
    pub error: String,
}

/// Body returned after a balance change
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    /// Empty on success
    pub error: String,
    /// Balance after the mutation
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

/// `/user/create` body
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Account ID
    pub id: AccountId,
    /// Initial balance
    pub balance: Decimal,
    /// Request token
    #[serde(default)]
    pub token: String,
}

/// `/user/get` body
#[derive(Debug, Deserialize)]
pub struct GetUserRequest {
    /// Account ID
    pub id: AccountId,
    /// Request token
    #[serde(default)]
    pub token: String,
}

/// `/user/deposit` body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    /// Account ID
    pub user_id: AccountId,
    /// Deposit ID
    pub deposit_id: DepositId,
    /// Amount
    pub amount: Decimal,
    /// Request token
    #[serde(default)]
    pub token: String,
}

/// `/transaction` body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// Account ID
    pub user_id: AccountId,
    /// Transaction ID
    pub transaction_id: TransactionId,
    /// `"Bet"` or `"Win"`
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Amount
    pub amount: Decimal,
    /// Request token
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: String,
    version: &'static str,
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/user/create", post(create_user))
        .route("/user/get", post(get_user))
        .route("/user/deposit", post(deposit))
        .route("/transaction", post(transaction))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Unwrap a JSON body, counting undecodable requests as rejected
fn decode<T>(
    state: &AppState,
    route: &str,
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, ApiError> {
    match payload {
        Ok(Json(request)) => Ok(request),
        Err(rejection) => {
            tracing::debug!(route, error = %rejection.body_text(), "Undecodable request body");
            state.metrics.record_request(route, "rejected");
            Err(rejection.into())
        }
    }
}

fn observe<T>(state: &AppState, route: &str, result: &Result<T, ApiError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(ApiError::Ledger(err)) if !err.is_validation() => "error",
        Err(_) => "rejected",
    };
    state.metrics.record_request(route, outcome);
}

async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Json<ErrorResponse>, ApiError> {
    let request = decode(&state, "create", payload)?;
    let result = state.authorize(&request.token).and_then(|_| {
        state
            .store
            .create_account(request.id, request.balance)
            .map_err(ApiError::from)
    });
    observe(&state, "create", &result);
    result?;

    Ok(Json(ErrorResponse {
        error: String::new(),
    }))
}

async fn get_user(
    State(state): State<AppState>,
    payload: Result<Json<GetUserRequest>, JsonRejection>,
) -> Result<Json<AccountSnapshot>, ApiError> {
    let request = decode(&state, "get", payload)?;
    let result = state
        .authorize(&request.token)
        .and_then(|_| state.store.get_account(request.id).map_err(ApiError::from));
    observe(&state, "get", &result);

    Ok(Json(result?))
}

async fn deposit(
    State(state): State<AppState>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let request = decode(&state, "deposit", payload)?;
    let result = state.authorize(&request.token).and_then(|_| {
        state
            .store
            .apply_deposit(request.user_id, request.deposit_id, request.amount)
            .map_err(ApiError::from)
    });
    observe(&state, "deposit", &result);

    Ok(Json(BalanceResponse {
        error: String::new(),
        balance: result?,
    }))
}

async fn transaction(
    State(state): State<AppState>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let request = decode(&state, "transaction", payload)?;
    let result = state.authorize(&request.token).and_then(|_| {
        let kind: TransactionKind = request.kind.parse().map_err(ApiError::BadRequest)?;
        state
            .store
            .apply_transaction(request.user_id, request.transaction_id, kind, request.amount)
            .map_err(ApiError::from)
    });
    observe(&state, "transaction", &result);

    Ok(Json(BalanceResponse {
        error: String::new(),
        balance: result?,
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: state.service_name.to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics_handler(State(state): State<AppState>) -> Result<String, ApiError> {
    state.metrics.export().map_err(|e| {
        ApiError::Ledger(Error::Concurrency(format!("Failed to export metrics: {}", e)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<LedgerStore>) {
        let store = Arc::new(LedgerStore::new());
        let state = AppState::new(store.clone(), Metrics::new().unwrap(), "testtask", "wallet-ledger");
        (router(state), store)
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_token_required() {
        let (app, store) = app();

        let (status, body) =
            post_json(&app, "/user/create", json!({"id": 1, "balance": 100})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing token");

        let (status, body) = post_json(
            &app,
            "/user/create",
            json!({"id": 1, "balance": 100, "token": "nope"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "token not correct");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_full_flow() {
        let (app, _) = app();

        let (status, body) = post_json(
            &app,
            "/user/create",
            json!({"id": 1, "balance": 100, "token": "testtask"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "");

        let (status, body) = post_json(
            &app,
            "/user/deposit",
            json!({"userId": 1, "depositId": 10, "amount": 50, "token": "testtask"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], 150.0);

        let (status, _) = post_json(
            &app,
            "/transaction",
            json!({"userId": 1, "transactionId": 20, "type": "Bet", "amount": 200, "token": "testtask"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = post_json(
            &app,
            "/transaction",
            json!({"userId": 1, "transactionId": 21, "type": "Win", "amount": 30, "token": "testtask"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], 180.0);

        let (status, body) =
            post_json(&app, "/user/get", json!({"id": 1, "token": "testtask"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], 180.0);
        assert_eq!(body["depositCount"], 1);
        assert_eq!(body["winCount"], 1);
        assert_eq!(body["betCount"], 0);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (app, store) = app();
        store.create_account(AccountId(1), Decimal::ONE).unwrap();

        let (status, _) = post_json(
            &app,
            "/user/create",
            json!({"id": 1, "balance": 1, "token": "testtask"}),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) =
            post_json(&app, "/user/get", json!({"id": 2, "token": "testtask"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Account not found: 2");

        let (status, _) = post_json(
            &app,
            "/transaction",
            json!({"userId": 1, "transactionId": 1, "type": "Draw", "amount": 1, "token": "testtask"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(store.transactions(AccountId(1)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let (app, _) = app();
        post_json(&app, "/user/get", json!({"id": 5, "token": "testtask"})).await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("wallet_requests_total"));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_undecodable_body_gets_json_error() {
        let (app, store) = app();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/user/create")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(!body["error"].as_str().unwrap().is_empty());

        let (status, body) = post_json(
            &app,
            "/user/deposit",
            json!({"userId": "one", "depositId": 1, "amount": 1, "token": "testtask"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_amount_overflow_is_unprocessable() {
        let (app, store) = app();
        store.create_account(AccountId(1), Decimal::MAX).unwrap();

        let (status, body) = post_json(
            &app,
            "/transaction",
            json!({"userId": 1, "transactionId": 1, "type": "Win", "amount": 1, "token": "testtask"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("out of range"));
        assert_eq!(store.get_account(AccountId(1)).unwrap().balance, Decimal::MAX);
    }
}
