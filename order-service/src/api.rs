use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use shared::gateway::OrderResponse;
use shared::http::{self, ApiResult};
use shared::{AuthenticatedUser, Checkout, CreateOrderArgs, Order, OrderStatus, OrderStore};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<dyn Checkout>,
    pub orders: Arc<dyn OrderStore>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub id: i64,
    pub price: i64,
    pub status: OrderStatus,
    pub item: String,
    pub reservation_id: Option<i64>,
    pub delivery_id: Option<i64>,
}

impl From<Order> for CreateOrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            price: order.price,
            status: order.status,
            item: order.item,
            reservation_id: order.reservation_id,
            delivery_id: order.delivery_id,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/v1/order/create", post(create_order))
        .route("/api/v1/internal/order/:id", get(get_order))
        .with_state(state);

    http::with_common_layers(router)
}

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateOrderArgs>,
) -> ApiResult<(StatusCode, Json<CreateOrderResponse>)> {
    let order = state.checkout.create_order(&user, request).await?;

    info!(order_id = order.id, user_id = user.id, status = %order.status, "order accepted");
    Ok((StatusCode::CREATED, Json(order.into())))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<OrderResponse>> {
    let order = state.orders.get(id).await?;
    Ok(Json(order.into()))
}
