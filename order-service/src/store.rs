use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use shared::db::DbPool;
use shared::{CheckoutError, Order, OrderStatus, OrderStore, Result};
use tracing::debug;

use crate::models::{NewOrder, OrderRow};
use crate::schema::orders;

pub struct PgOrderStore {
    pool: DbPool,
}

impl PgOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, owner_id: i64, price: i64, item: &str, status: OrderStatus) -> Result<Order> {
        let mut conn = self.pool.get().await?;

        let row = diesel::insert_into(orders::table)
            .values(&NewOrder {
                owner_id,
                item,
                price,
                status: status.as_str(),
            })
            .returning(OrderRow::as_returning())
            .get_result(&mut conn)
            .await?;

        Order::try_from(row)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(orders::table.find(id))
            .execute(&mut conn)
            .await?;
        if deleted == 0 {
            debug!(order_id = id, "order already absent");
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Order> {
        let mut conn = self.pool.get().await?;

        let row = orders::table
            .find(id)
            .select(OrderRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| CheckoutError::NotFound(format!("order {id}")))?;

        Order::try_from(row)
    }

    async fn set_status(&self, id: i64, status: OrderStatus) -> Result<()> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, CheckoutError, _>(|conn| {
            Box::pin(async move {
                let current: String = orders::table
                    .find(id)
                    .select(orders::status)
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?
                    .ok_or_else(|| CheckoutError::NotFound(format!("order {id}")))?;
                let current: OrderStatus = current.parse()?;

                if !current.can_advance_to(status) {
                    debug!(order_id = id, %current, requested = %status, "ignoring backward status change");
                    return Ok(());
                }

                diesel::update(orders::table.find(id))
                    .set((
                        orders::status.eq(status.as_str()),
                        orders::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;

                Ok(())
            })
        })
        .await
    }

    async fn record_fulfillment(
        &self,
        id: i64,
        reservation_id: i64,
        delivery_id: i64,
        status: OrderStatus,
    ) -> Result<Order> {
        let mut conn = self.pool.get().await?;

        let row = conn
            .transaction::<_, CheckoutError, _>(|conn| {
                Box::pin(async move {
                    let current: OrderRow = orders::table
                        .find(id)
                        .select(OrderRow::as_select())
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| CheckoutError::NotFound(format!("order {id}")))?;

                    let current_status: OrderStatus = current.status.parse()?;
                    let next = if current_status.can_advance_to(status) {
                        status
                    } else {
                        current_status
                    };

                    let row = diesel::update(orders::table.find(id))
                        .set((
                            orders::reservation_id.eq(Some(reservation_id)),
                            orders::delivery_id.eq(Some(delivery_id)),
                            orders::status.eq(next.as_str()),
                            orders::updated_at.eq(Utc::now()),
                        ))
                        .returning(OrderRow::as_returning())
                        .get_result(conn)
                        .await?;

                    Ok(row)
                })
            })
            .await?;

        Order::try_from(row)
    }
}
