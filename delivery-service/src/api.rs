use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use shared::gateway::AssignCourierRequest;
use shared::http::{self, ApiResult};
use shared::{Courier, CourierAssignment, Delivery};

use crate::service::DeliveryService;

#[derive(Clone)]
pub struct AppState {
    pub deliveries: Arc<DeliveryService>,
}

#[derive(Debug, Deserialize)]
pub struct AddCourierRequest {
    pub name: String,
    #[serde(default = "on_shift")]
    pub is_on_shift: bool,
}

fn on_shift() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: bool,
}

#[derive(Debug, Serialize)]
pub struct DeliveryList {
    pub list: Vec<Delivery>,
}

pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/v1/internal/delivery/apply", post(apply_courier))
        .route("/api/v1/internal/delivery/courier", post(add_courier))
        .route("/api/v1/internal/delivery/list", get(list_deliveries))
        .route("/api/v1/internal/delivery/:id", get(get_delivery))
        .route("/api/v1/internal/delivery/:id/complete", post(complete_delivery))
        .route("/api/v1/internal/delivery/:id/release", post(release_delivery))
        .with_state(state);

    http::with_common_layers(router)
}

pub async fn apply_courier(
    State(state): State<AppState>,
    Json(request): Json<AssignCourierRequest>,
) -> ApiResult<Json<CourierAssignment>> {
    Ok(Json(state.deliveries.assign_courier(request.order_id).await?))
}

pub async fn add_courier(
    State(state): State<AppState>,
    Json(request): Json<AddCourierRequest>,
) -> ApiResult<(StatusCode, Json<Courier>)> {
    let courier = state
        .deliveries
        .add_courier(&request.name, request.is_on_shift)
        .await?;
    Ok((StatusCode::CREATED, Json(courier)))
}

pub async fn list_deliveries(State(state): State<AppState>) -> ApiResult<Json<DeliveryList>> {
    Ok(Json(DeliveryList {
        list: state.deliveries.deliveries().await?,
    }))
}

pub async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Delivery>> {
    Ok(Json(state.deliveries.delivery(id).await?))
}

pub async fn complete_delivery(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Delivery>> {
    Ok(Json(state.deliveries.complete(id).await?))
}

pub async fn release_delivery(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ReleaseResponse>> {
    Ok(Json(ReleaseResponse {
        released: state.deliveries.release(id).await?,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::repo::memory::InMemoryDeliveryRepo;
    use crate::service::FirstIdleSelector;

    fn app() -> Router {
        let service = DeliveryService::new(
            Arc::new(InMemoryDeliveryRepo::default()),
            Arc::new(FirstIdleSelector),
        );
        create_router(AppState {
            deliveries: Arc::new(service),
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

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn courier_lifecycle() {
        let app = app();

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/internal/delivery/courier", r#"{"name":"ann"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/internal/delivery/apply", r#"{"order_id":10}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let assigned = json(response).await;
        assert_eq!(assigned["courier_id"], 1);
        let delivery_id = assigned["delivery_id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(get(&format!("/api/v1/internal/delivery/{delivery_id}")))
            .await
            .unwrap();
        let delivery = json(response).await;
        assert_eq!(delivery["order_id"], 10);
        assert_eq!(delivery["status"], "on_the_way");

        let response = app
            .clone()
            .oneshot(post_json(&format!("/api/v1/internal/delivery/{delivery_id}/complete"), ""))
            .await
            .unwrap();
        assert_eq!(json(response).await["status"], "delivered");

        let response = app.oneshot(get("/api/v1/internal/delivery/list")).await.unwrap();
        let list = json(response).await;
        assert_eq!(list["list"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn releasing_a_delivery_is_repeatable() {
        let app = app();
        app.clone()
            .oneshot(post_json("/api/v1/internal/delivery/courier", r#"{"name":"ann"}"#))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/internal/delivery/apply", r#"{"order_id":10}"#))
            .await
            .unwrap();
        let delivery_id = json(response).await["delivery_id"].as_i64().unwrap();
        let uri = format!("/api/v1/internal/delivery/{delivery_id}/release");

        let response = app.clone().oneshot(post_json(&uri, "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["released"], true);

        let response = app.oneshot(post_json(&uri, "")).await.unwrap();
        assert_eq!(json(response).await["released"], false);
    }

    #[tokio::test]
    async fn no_idle_courier_conflicts() {
        let response = app()
            .oneshot(post_json("/api/v1/internal/delivery/apply", r#"{"order_id":10}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json(response).await["code"], "no_courier_available");
    }

    #[tokio::test]
    async fn unknown_delivery_is_not_found() {
        let response = app().oneshot(get("/api/v1/internal/delivery/5")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
