use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::{Item, Reservation};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::stock)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StockRow {
    pub item_id: String,
    pub amount: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::stock)]
pub struct NewStock<'a> {
    pub item_id: &'a str,
    pub amount: i64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::reservations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReservationRow {
    pub id: i64,
    pub order_id: i64,
    pub item_id: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct NewReservation<'a> {
    pub order_id: i64,
    pub item_id: &'a str,
    pub amount: i64,
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        Reservation {
            id: row.id,
            order_id: row.order_id,
            item: Item {
                item_id: row.item_id,
                amount: row.amount,
            },
        }
    }
}
