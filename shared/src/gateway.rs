//! HTTP clients for the downstream services. Calls use a short fixed timeout
//! and are never retried here; retrying and compensating is up to the caller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, ErrorBody, Result};
use crate::models::{CourierAssignment, Item, Order, OrderStatus, UserAccount, UserInfo};
use crate::ports::{BillingGateway, DeliveryGateway, InventoryGateway, OrderGateway, UserDirectory};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CheckoutError::Transport(format!("failed to build http client: {e}")))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }
    Err(read_error(status.as_u16(), response).await)
}

async fn expect_success(response: Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(read_error(status.as_u16(), response).await)
}

async fn read_error(status: u16, response: Response) -> CheckoutError {
    let body = response
        .json::<ErrorBody>()
        .await
        .unwrap_or_else(|_| ErrorBody::new(format!("unexpected status code: {status}"), ""));
    CheckoutError::from_remote(status, body)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MoneyRequest {
    pub user_id: i64,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: i64,
    pub balance: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: i64,
    pub user_id: i64,
    pub balance: i64,
}

pub struct BillingClient {
    base_url: String,
    http: Client,
}

impl BillingClient {
    pub fn new(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    async fn move_money(&self, path: &str, user_id: i64, amount: i64) -> Result<BalanceResponse> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&MoneyRequest { user_id, amount })
            .send()
            .await?;
        read_json(response).await
    }
}

#[async_trait]
impl BillingGateway for BillingClient {
    async fn withdraw(&self, user_id: i64, amount: i64) -> Result<()> {
        self.move_money("/api/v1/billing/money/withdraw", user_id, amount)
            .await
            .map(|_| ())
    }

    async fn credit(&self, user_id: i64, amount: i64) -> Result<()> {
        self.move_money("/api/v1/billing/money/credit", user_id, amount)
            .await
            .map(|_| ())
    }

    async fn account(&self, user_id: i64) -> Result<UserAccount> {
        let response = self
            .http
            .get(format!("{}/api/v1/billing/account/{}", self.base_url, user_id))
            .send()
            .await?;
        let account: AccountResponse = read_json(response).await?;
        Ok(UserAccount {
            id: account.id,
            user_id: account.user_id,
            balance: account.balance,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub order_id: i64,
    pub item: Item,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReserveResponse {
    pub reservation_id: i64,
}

pub struct InventoryClient {
    base_url: String,
    http: Client,
}

impl InventoryClient {
    pub fn new(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }
}

#[async_trait]
impl InventoryGateway for InventoryClient {
    async fn reserve(&self, order_id: i64, item_id: &str, amount: i64) -> Result<i64> {
        let request = ReserveRequest {
            order_id,
            item: Item {
                item_id: item_id.to_string(),
                amount,
            },
        };
        let response = self
            .http
            .post(format!("{}/api/v1/internal/inventory/item/reserve", self.base_url))
            .json(&request)
            .send()
            .await?;
        let reserved: ReserveResponse = read_json(response).await?;
        Ok(reserved.reservation_id)
    }

    async fn cancel(&self, reservation_id: i64) -> Result<()> {
        let response = self
            .http
            .post(format!(
                "{}/api/v1/internal/inventory/reservation/{}/cancel",
                self.base_url, reservation_id
            ))
            .send()
            .await?;
        expect_success(response).await
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignCourierRequest {
    pub order_id: i64,
}

pub struct DeliveryClient {
    base_url: String,
    http: Client,
}

impl DeliveryClient {
    pub fn new(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }
}

#[async_trait]
impl DeliveryGateway for DeliveryClient {
    async fn assign_courier(&self, order_id: i64) -> Result<CourierAssignment> {
        let response = self
            .http
            .post(format!("{}/api/v1/internal/delivery/apply", self.base_url))
            .json(&AssignCourierRequest { order_id })
            .send()
            .await?;
        read_json(response).await
    }

    async fn release(&self, delivery_id: i64) -> Result<()> {
        let response = self
            .http
            .post(format!(
                "{}/api/v1/internal/delivery/{}/release",
                self.base_url, delivery_id
            ))
            .send()
            .await?;
        expect_success(response).await
    }
}

/// Order representation served by the order service's internal endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: i64,
    pub price: i64,
    pub status: OrderStatus,
    pub item: String,
    pub user_id: i64,
    #[serde(default)]
    pub reservation_id: Option<i64>,
    #[serde(default)]
    pub delivery_id: Option<i64>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            price: order.price,
            status: order.status,
            item: order.item,
            user_id: order.owner_id,
            reservation_id: order.reservation_id,
            delivery_id: order.delivery_id,
        }
    }
}

impl From<OrderResponse> for Order {
    fn from(order: OrderResponse) -> Self {
        Self {
            id: order.id,
            owner_id: order.user_id,
            item: order.item,
            price: order.price,
            status: order.status,
            reservation_id: order.reservation_id,
            delivery_id: order.delivery_id,
        }
    }
}

pub struct OrderClient {
    base_url: String,
    http: Client,
}

impl OrderClient {
    pub fn new(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }
}

#[async_trait]
impl OrderGateway for OrderClient {
    async fn order(&self, id: i64) -> Result<Order> {
        let response = self
            .http
            .get(format!("{}/api/v1/internal/order/{}", self.base_url, id))
            .send()
            .await?;
        let order: OrderResponse = read_json(response).await?;
        Ok(order.into())
    }
}

pub struct UserClient {
    base_url: String,
    http: Client,
}

impl UserClient {
    pub fn new(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }
}

#[async_trait]
impl UserDirectory for UserClient {
    async fn user(&self, id: i64) -> Result<UserInfo> {
        let response = self
            .http
            .get(format!("{}/internal/api/v1/user/by_id/{}", self.base_url, id))
            .send()
            .await?;
        read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::Path;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    use super::*;
    use crate::http::ApiError;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn billing_stub() -> Router {
        Router::new()
            .route(
                "/api/v1/billing/account/:user_id",
                get(|Path(user_id): Path<i64>| async move {
                    if user_id == 1 {
                        Ok(Json(AccountResponse {
                            id: 5,
                            user_id,
                            balance: 700,
                        }))
                    } else {
                        Err(ApiError(CheckoutError::NotFound(format!("account of user {user_id}"))))
                    }
                }),
            )
            .route(
                "/api/v1/billing/money/withdraw",
                post(|| async {
                    ApiError(CheckoutError::InsufficientFunds {
                        balance: 100,
                        requested: 300,
                    })
                }),
            )
    }

    #[tokio::test]
    async fn billing_client_decodes_accounts_and_typed_errors() {
        let base_url = serve(billing_stub()).await;
        let client = BillingClient::new(base_url, http_client(DEFAULT_TIMEOUT).unwrap());

        let account = client.account(1).await.unwrap();
        assert_eq!(
            account,
            UserAccount {
                id: 5,
                user_id: 1,
                balance: 700
            }
        );

        assert!(matches!(client.account(2).await, Err(CheckoutError::NotFound(_))));
        assert!(matches!(
            client.withdraw(1, 300).await,
            Err(CheckoutError::InsufficientFunds {
                balance: 100,
                requested: 300
            })
        ));
    }

    #[tokio::test]
    async fn delivery_client_release_accepts_any_success() {
        let router = Router::new().route(
            "/api/v1/internal/delivery/:id/release",
            post(|| async { Json(serde_json::json!({ "released": false })) }),
        );
        let base_url = serve(router).await;
        let client = DeliveryClient::new(base_url, http_client(DEFAULT_TIMEOUT).unwrap());

        client.release(9).await.unwrap();
    }

    #[test]
    fn order_response_round_trips_owner() {
        let order = Order {
            id: 3,
            owner_id: 9,
            item: "widget".into(),
            price: 300,
            status: OrderStatus::Paid,
            reservation_id: Some(4),
            delivery_id: None,
        };
        let json = serde_json::to_value(OrderResponse::from(order.clone())).unwrap();
        assert_eq!(json["user_id"], 9);
        assert_eq!(json["status"], "paid");

        let back: OrderResponse = serde_json::from_value(json).unwrap();
        assert_eq!(Order::from(back), order);
    }
}
