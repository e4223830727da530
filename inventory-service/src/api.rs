use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use shared::gateway::{ReserveRequest, ReserveResponse};
use shared::http::{self, ApiResult};
use shared::{Item, Reservation};
use tracing::info;

use crate::inventory::StockRepo;

#[derive(Clone)]
pub struct AppState {
    pub stock: Arc<dyn StockRepo>,
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub item_id: String,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/v1/internal/inventory/item/add", post(add_item))
        .route("/api/v1/internal/inventory/item/reserve", post(reserve_item))
        .route("/api/v1/internal/inventory/reservation/:id", get(get_reservation))
        .route("/api/v1/internal/inventory/reservation/:id/cancel", post(cancel_reservation))
        .with_state(state);

    http::with_common_layers(router)
}

pub async fn add_item(
    State(state): State<AppState>,
    Json(item): Json<Item>,
) -> ApiResult<Json<StockResponse>> {
    let amount = state.stock.add(&item).await?;

    info!(item = %item.item_id, added = item.amount, amount, "stock added");
    Ok(Json(StockResponse {
        item_id: item.item_id,
        amount,
    }))
}

pub async fn reserve_item(
    State(state): State<AppState>,
    Json(request): Json<ReserveRequest>,
) -> ApiResult<Json<ReserveResponse>> {
    let reservation_id = state.stock.reserve(request.order_id, &request.item).await?;
    Ok(Json(ReserveResponse { reservation_id }))
}

pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CancelResponse>> {
    let cancelled = state.stock.cancel(id).await?;

    if cancelled {
        info!(reservation_id = id, "reservation cancelled");
    } else {
        info!(reservation_id = id, "reservation already gone");
    }
    Ok(Json(CancelResponse { cancelled }))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Reservation>> {
    Ok(Json(state.stock.reservation(id).await?))
}
