use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncConnection, RunQueryDsl};
use shared::db::DbPool;
use shared::{CheckoutError, Item, Reservation, Result};
use tracing::{debug, info};

use crate::models::{NewReservation, NewStock, ReservationRow, StockRow};
use crate::schema::{reservations, stock};

/// Remaining stock after taking `requested` units of `item_id`.
pub fn take_stock(item_id: &str, available: i64, requested: i64) -> Result<i64> {
    if requested <= 0 {
        return Err(CheckoutError::Validation(format!(
            "amount must be positive, got {requested}"
        )));
    }
    if available < requested {
        return Err(CheckoutError::InsufficientStock {
            item: item_id.to_string(),
            available,
        });
    }
    Ok(available - requested)
}

#[async_trait]
pub trait StockRepo: Send + Sync {
    /// Adds units of an item, creating the stock row on first use. Returns
    /// the new amount.
    async fn add(&self, item: &Item) -> Result<i64>;

    /// Takes stock for an order. A second reservation of the same item for
    /// the same order returns the first one.
    async fn reserve(&self, order_id: i64, item: &Item) -> Result<i64>;

    /// Returns the reserved units to stock. Returns `false` when the
    /// reservation does not exist.
    async fn cancel(&self, reservation_id: i64) -> Result<bool>;

    async fn reservation(&self, reservation_id: i64) -> Result<Reservation>;
}

pub struct PgStockRepo {
    pool: DbPool,
}

impl PgStockRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StockRepo for PgStockRepo {
    async fn add(&self, item: &Item) -> Result<i64> {
        if item.amount <= 0 {
            return Err(CheckoutError::Validation(format!(
                "amount must be positive, got {}",
                item.amount
            )));
        }
        let mut conn = self.pool.get().await?;

        let row = diesel::insert_into(stock::table)
            .values(&NewStock {
                item_id: &item.item_id,
                amount: item.amount,
            })
            .on_conflict(stock::item_id)
            .do_update()
            .set((
                stock::amount.eq(stock::amount + excluded(stock::amount)),
                stock::updated_at.eq(Utc::now()),
            ))
            .returning(StockRow::as_returning())
            .get_result(&mut conn)
            .await?;

        Ok(row.amount)
    }

    async fn reserve(&self, order_id: i64, item: &Item) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let item = item.clone();

        conn.transaction::<_, CheckoutError, _>(|conn| {
            Box::pin(async move {
                let existing: Option<i64> = reservations::table
                    .filter(reservations::order_id.eq(order_id))
                    .filter(reservations::item_id.eq(&item.item_id))
                    .select(reservations::id)
                    .first(conn)
                    .await
                    .optional()?;
                if let Some(id) = existing {
                    debug!(order_id, reservation_id = id, "order already holds a reservation");
                    return Ok(id);
                }

                let available: i64 = stock::table
                    .find(&item.item_id)
                    .select(stock::amount)
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?
                    .unwrap_or(0);
                let remaining = take_stock(&item.item_id, available, item.amount)?;

                diesel::update(stock::table.find(&item.item_id))
                    .set((stock::amount.eq(remaining), stock::updated_at.eq(Utc::now())))
                    .execute(conn)
                    .await?;

                let id = diesel::insert_into(reservations::table)
                    .values(&NewReservation {
                        order_id,
                        item_id: &item.item_id,
                        amount: item.amount,
                    })
                    .returning(reservations::id)
                    .get_result(conn)
                    .await?;

                info!(order_id, reservation_id = id, item = %item.item_id, remaining, "item reserved");
                Ok(id)
            })
        })
        .await
    }

    async fn cancel(&self, reservation_id: i64) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, CheckoutError, _>(|conn| {
            Box::pin(async move {
                let reservation = reservations::table
                    .find(reservation_id)
                    .select(ReservationRow::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;
                let Some(reservation) = reservation else {
                    return Ok(false);
                };

                diesel::update(stock::table.find(&reservation.item_id))
                    .set((
                        stock::amount.eq(stock::amount + reservation.amount),
                        stock::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;
                diesel::delete(reservations::table.find(reservation_id))
                    .execute(conn)
                    .await?;

                Ok(true)
            })
        })
        .await
    }

    async fn reservation(&self, reservation_id: i64) -> Result<Reservation> {
        let mut conn = self.pool.get().await?;

        reservations::table
            .find(reservation_id)
            .select(ReservationRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(Reservation::from)
            .ok_or_else(|| CheckoutError::NotFound(format!("reservation {reservation_id}")))
    }
}

#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct State {
        stock: HashMap<String, i64>,
        reservations: HashMap<i64, Reservation>,
        next_id: i64,
    }

    #[derive(Default)]
    pub struct InMemoryStockRepo {
        state: Mutex<State>,
    }

    impl InMemoryStockRepo {
        pub async fn stock(&self, item_id: &str) -> i64 {
            self.state.lock().await.stock.get(item_id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl StockRepo for InMemoryStockRepo {
        async fn add(&self, item: &Item) -> Result<i64> {
            if item.amount <= 0 {
                return Err(CheckoutError::Validation("amount must be positive".into()));
            }
            let mut state = self.state.lock().await;
            let amount = state.stock.entry(item.item_id.clone()).or_insert(0);
            *amount += item.amount;
            Ok(*amount)
        }

        async fn reserve(&self, order_id: i64, item: &Item) -> Result<i64> {
            let mut state = self.state.lock().await;
            if let Some(existing) = state
                .reservations
                .values()
                .find(|r| r.order_id == order_id && r.item.item_id == item.item_id)
            {
                return Ok(existing.id);
            }

            let available = state.stock.get(&item.item_id).copied().unwrap_or(0);
            let remaining = take_stock(&item.item_id, available, item.amount)?;
            state.stock.insert(item.item_id.clone(), remaining);

            state.next_id += 1;
            let id = state.next_id;
            state.reservations.insert(
                id,
                Reservation {
                    id,
                    order_id,
                    item: item.clone(),
                },
            );
            Ok(id)
        }

        async fn cancel(&self, reservation_id: i64) -> Result<bool> {
            let mut state = self.state.lock().await;
            let Some(reservation) = state.reservations.remove(&reservation_id) else {
                return Ok(false);
            };
            *state.stock.entry(reservation.item.item_id).or_insert(0) += reservation.item.amount;
            Ok(true)
        }

        async fn reservation(&self, reservation_id: i64) -> Result<Reservation> {
            self.state
                .lock()
                .await
                .reservations
                .get(&reservation_id)
                .cloned()
                .ok_or_else(|| CheckoutError::NotFound(format!("reservation {reservation_id}")))
        }
    }
}
