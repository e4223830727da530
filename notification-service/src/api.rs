use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::http::{self, ApiResult};
use shared::{AuthenticatedUser, Notification, UserDirectory};

use crate::store::NotificationStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NotificationStore>,
    pub users: Arc<dyn UserDirectory>,
}

#[derive(Debug, Serialize)]
pub struct NotificationItem {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub recipient: String,
}

impl From<Notification> for NotificationItem {
    fn from(n: Notification) -> Self {
        Self {
            timestamp: n.timestamp,
            message: n.message,
            recipient: n.recipient,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationList {
    pub notifications: Vec<NotificationItem>,
}

pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/v1/notification/list", get(list_notifications))
        .with_state(state);

    http::with_common_layers(router)
}

pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<NotificationList>> {
    let info = state.users.user(user.id).await?;
    let notifications = state.store.for_recipient(&info.email).await?;

    Ok(Json(NotificationList {
        notifications: notifications.into_iter().map(NotificationItem::from).collect(),
    }))
}
