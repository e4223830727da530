use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use shared::gateway::{AccountResponse, BalanceResponse, MoneyRequest};
use shared::http::{self, ApiResult};
use shared::BalanceChange;
use tracing::info;

use crate::accounts::AccountRepo;

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountRepo>,
}

pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/v1/billing/money/credit", post(credit))
        .route("/api/v1/billing/money/withdraw", post(withdraw))
        .route("/api/v1/billing/account/:user_id", get(account))
        .with_state(state);

    http::with_common_layers(router)
}

async fn change(state: &AppState, request: MoneyRequest, change: BalanceChange) -> ApiResult<Json<BalanceResponse>> {
    let account = state.accounts.change_balance(request.user_id, change).await?;

    info!(user_id = account.user_id, change = ?change, balance = account.balance, "balance changed");
    Ok(Json(BalanceResponse {
        user_id: account.user_id,
        balance: account.balance,
    }))
}

pub async fn credit(
    State(state): State<AppState>,
    Json(request): Json<MoneyRequest>,
) -> ApiResult<Json<BalanceResponse>> {
    let amount = request.amount;
    change(&state, request, BalanceChange::Credit(amount)).await
}

pub async fn withdraw(
    State(state): State<AppState>,
    Json(request): Json<MoneyRequest>,
) -> ApiResult<Json<BalanceResponse>> {
    let amount = request.amount;
    change(&state, request, BalanceChange::Withdraw(amount)).await
}

pub async fn account(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<AccountResponse>> {
    let account = state.accounts.get(user_id).await?;
    Ok(Json(AccountResponse {
        id: account.id,
        user_id: account.user_id,
        balance: account.balance,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::accounts::memory::InMemoryAccountRepo;

    async fn app() -> Router {
        let accounts = InMemoryAccountRepo::default().with_balance(1, 1000).await;
        create_router(AppState {
            accounts: Arc::new(accounts),
        })
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn withdraw_then_credit_restores_the_balance() {
        let app = app().await;

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/billing/money/withdraw", r#"{"user_id":1,"amount":500}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["balance"], 500);

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/billing/money/credit", r#"{"user_id":1,"amount":500}"#))
            .await
            .unwrap();
        assert_eq!(json(response).await["balance"], 1000);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/billing/account/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["user_id"], 1);
        assert_eq!(body["balance"], 1000);
    }

    #[tokio::test]
    async fn overdraft_is_refused_with_details() {
        let response = app()
            .await
            .oneshot(post_json("/api/v1/billing/money/withdraw", r#"{"user_id":1,"amount":1500}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json(response).await;
        assert_eq!(body["code"], "insufficient_funds");
        assert_eq!(body["balance"], 1000);
        assert_eq!(body["requested"], 1500);
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let response = app()
            .await
            .oneshot(post_json("/api/v1/billing/money/credit", r#"{"user_id":2,"amount":10}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_positive_amount_is_a_bad_request() {
        let response = app()
            .await
            .oneshot(post_json("/api/v1/billing/money/withdraw", r#"{"user_id":1,"amount":0}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
