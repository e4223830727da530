use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use shared::db::DbPool;
use shared::{Notification, Result};

use crate::models::{NewNotification, NotificationRow};
use crate::schema::notifications;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Stores a notification. Returns `false` when the same message was
    /// already recorded for the order.
    async fn record(&self, order_id: i64, recipient: &str, message: &str) -> Result<bool>;

    async fn for_recipient(&self, recipient: &str) -> Result<Vec<Notification>>;
}

pub struct PgNotificationStore {
    pool: DbPool,
}

impl PgNotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn record(&self, order_id: i64, recipient: &str, message: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let inserted = diesel::insert_into(notifications::table)
            .values(&NewNotification {
                order_id,
                recipient,
                message,
            })
            .on_conflict((notifications::order_id, notifications::message))
            .do_nothing()
            .execute(&mut conn)
            .await?;

        Ok(inserted == 1)
    }

    async fn for_recipient(&self, recipient: &str) -> Result<Vec<Notification>> {
        let mut conn = self.pool.get().await?;

        let rows = notifications::table
            .filter(notifications::recipient.eq(recipient))
            .order(notifications::created_at.desc())
            .select(NotificationRow::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }
}
