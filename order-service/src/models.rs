use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::{CheckoutError, Order};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: i64,
    pub owner_id: i64,
    pub item: String,
    pub price: i64,
    pub status: String,
    pub reservation_id: Option<i64>,
    pub delivery_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder<'a> {
    pub owner_id: i64,
    pub item: &'a str,
    pub price: i64,
    pub status: &'a str,
}

impl TryFrom<OrderRow> for Order {
    type Error = CheckoutError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            owner_id: row.owner_id,
            item: row.item,
            price: row.price,
            status: row.status.parse()?,
            reservation_id: row.reservation_id,
            delivery_id: row.delivery_id,
        })
    }
}
