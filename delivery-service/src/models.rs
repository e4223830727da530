use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::{CheckoutError, Courier, Delivery};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::couriers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CourierRow {
    pub id: i64,
    pub name: String,
    pub is_on_shift: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::couriers)]
pub struct NewCourier<'a> {
    pub name: &'a str,
    pub is_on_shift: bool,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::deliveries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DeliveryRow {
    pub id: i64,
    pub order_id: i64,
    pub courier_id: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::deliveries)]
pub struct NewDelivery<'a> {
    pub order_id: i64,
    pub courier_id: i64,
    pub status: &'a str,
}

impl From<CourierRow> for Courier {
    fn from(row: CourierRow) -> Self {
        Courier {
            id: row.id,
            name: row.name,
            is_on_shift: row.is_on_shift,
        }
    }
}

impl TryFrom<DeliveryRow> for Delivery {
    type Error = CheckoutError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        Ok(Delivery {
            id: row.id,
            order_id: row.order_id,
            courier_id: row.courier_id,
            status: row.status.parse()?,
        })
    }
}
