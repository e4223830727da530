use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::Notification;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NotificationRow {
    pub id: i64,
    pub order_id: i64,
    pub recipient: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::notifications)]
pub struct NewNotification<'a> {
    pub order_id: i64,
    pub recipient: &'a str,
    pub message: &'a str,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id,
            timestamp: row.created_at,
            recipient: row.recipient,
            message: row.message,
        }
    }
}
