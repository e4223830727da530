use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use shared::db::DbPool;
use shared::{CheckoutError, Courier, Delivery, DeliveryStatus, Result};

use crate::models::{CourierRow, DeliveryRow, NewCourier, NewDelivery};
use crate::schema::{couriers, deliveries};

#[async_trait]
pub trait DeliveryRepo: Send + Sync {
    async fn add_courier(&self, name: &str, is_on_shift: bool) -> Result<Courier>;

    /// Couriers on shift without a delivery on the way.
    async fn idle_couriers(&self) -> Result<Vec<Courier>>;

    async fn delivery_for_order(&self, order_id: i64) -> Result<Option<Delivery>>;

    /// Fails with `AlreadyExists` when the order already has a delivery.
    async fn add_delivery(&self, order_id: i64, courier_id: i64) -> Result<Delivery>;

    async fn deliveries(&self) -> Result<Vec<Delivery>>;

    async fn delivery(&self, id: i64) -> Result<Delivery>;

    async fn set_status(&self, id: i64, status: DeliveryStatus) -> Result<Delivery>;

    /// Deletes the delivery if it is still on the way.
    async fn remove_on_the_way(&self, id: i64) -> Result<bool>;
}

pub struct PgDeliveryRepo {
    pool: DbPool,
}

impl PgDeliveryRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryRepo for PgDeliveryRepo {
    async fn add_courier(&self, name: &str, is_on_shift: bool) -> Result<Courier> {
        let mut conn = self.pool.get().await?;

        let row = diesel::insert_into(couriers::table)
            .values(&NewCourier { name, is_on_shift })
            .returning(CourierRow::as_returning())
            .get_result(&mut conn)
            .await?;

        Ok(row.into())
    }

    async fn idle_couriers(&self) -> Result<Vec<Courier>> {
        let mut conn = self.pool.get().await?;

        let rows = couriers::table
            .left_join(
                deliveries::table.on(deliveries::courier_id
                    .eq(couriers::id)
                    .and(deliveries::status.eq(DeliveryStatus::OnTheWay.as_str()))),
            )
            .filter(couriers::is_on_shift.eq(true))
            .filter(deliveries::id.is_null())
            .select(CourierRow::as_select())
            .order(couriers::id)
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().map(Courier::from).collect())
    }

    async fn delivery_for_order(&self, order_id: i64) -> Result<Option<Delivery>> {
        let mut conn = self.pool.get().await?;

        deliveries::table
            .filter(deliveries::order_id.eq(order_id))
            .select(DeliveryRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(Delivery::try_from)
            .transpose()
    }

    async fn add_delivery(&self, order_id: i64, courier_id: i64) -> Result<Delivery> {
        let mut conn = self.pool.get().await?;

        let row = diesel::insert_into(deliveries::table)
            .values(&NewDelivery {
                order_id,
                courier_id,
                status: DeliveryStatus::OnTheWay.as_str(),
            })
            .returning(DeliveryRow::as_returning())
            .get_result(&mut conn)
            .await?;

        Delivery::try_from(row)
    }

    async fn deliveries(&self) -> Result<Vec<Delivery>> {
        let mut conn = self.pool.get().await?;

        deliveries::table
            .select(DeliveryRow::as_select())
            .order(deliveries::id)
            .load(&mut conn)
            .await?
            .into_iter()
            .map(Delivery::try_from)
            .collect()
    }

    async fn delivery(&self, id: i64) -> Result<Delivery> {
        let mut conn = self.pool.get().await?;

        let row = deliveries::table
            .find(id)
            .select(DeliveryRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| CheckoutError::NotFound(format!("delivery {id}")))?;

        Delivery::try_from(row)
    }

    async fn set_status(&self, id: i64, status: DeliveryStatus) -> Result<Delivery> {
        let mut conn = self.pool.get().await?;

        let row = diesel::update(deliveries::table.find(id))
            .set((
                deliveries::status.eq(status.as_str()),
                deliveries::updated_at.eq(Utc::now()),
            ))
            .returning(DeliveryRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| CheckoutError::NotFound(format!("delivery {id}")))?;

        Delivery::try_from(row)
    }

    async fn remove_on_the_way(&self, id: i64) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let removed = diesel::delete(
            deliveries::table
                .find(id)
                .filter(deliveries::status.eq(DeliveryStatus::OnTheWay.as_str())),
        )
        .execute(&mut conn)
        .await?;

        Ok(removed == 1)
    }
}

#[cfg(test)]
pub mod memory {
    use std::collections::BTreeMap;

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct State {
        couriers: BTreeMap<i64, Courier>,
        deliveries: BTreeMap<i64, Delivery>,
    }

    #[derive(Default)]
    pub struct InMemoryDeliveryRepo {
        state: Mutex<State>,
    }

    #[async_trait]
    impl DeliveryRepo for InMemoryDeliveryRepo {
        async fn add_courier(&self, name: &str, is_on_shift: bool) -> Result<Courier> {
            let mut state = self.state.lock().await;
            let courier = Courier {
                id: state.couriers.len() as i64 + 1,
                name: name.to_string(),
                is_on_shift,
            };
            state.couriers.insert(courier.id, courier.clone());
            Ok(courier)
        }

        async fn idle_couriers(&self) -> Result<Vec<Courier>> {
            let state = self.state.lock().await;
            Ok(state
                .couriers
                .values()
                .filter(|c| c.is_on_shift)
                .filter(|c| {
                    !state
                        .deliveries
                        .values()
                        .any(|d| d.courier_id == c.id && d.status == DeliveryStatus::OnTheWay)
                })
                .cloned()
                .collect())
        }

        async fn delivery_for_order(&self, order_id: i64) -> Result<Option<Delivery>> {
            let state = self.state.lock().await;
            Ok(state
                .deliveries
                .values()
                .find(|d| d.order_id == order_id)
                .cloned())
        }

        async fn add_delivery(&self, order_id: i64, courier_id: i64) -> Result<Delivery> {
            let mut state = self.state.lock().await;
            if state.deliveries.values().any(|d| d.order_id == order_id) {
                return Err(CheckoutError::AlreadyExists(format!("delivery for order {order_id}")));
            }
            let delivery = Delivery {
                id: state.deliveries.keys().next_back().map_or(1, |id| id + 1),
                order_id,
                courier_id,
                status: DeliveryStatus::OnTheWay,
            };
            state.deliveries.insert(delivery.id, delivery.clone());
            Ok(delivery)
        }

        async fn deliveries(&self) -> Result<Vec<Delivery>> {
            Ok(self.state.lock().await.deliveries.values().cloned().collect())
        }

        async fn delivery(&self, id: i64) -> Result<Delivery> {
            self.state
                .lock()
                .await
                .deliveries
                .get(&id)
                .cloned()
                .ok_or_else(|| CheckoutError::NotFound(format!("delivery {id}")))
        }

        async fn set_status(&self, id: i64, status: DeliveryStatus) -> Result<Delivery> {
            let mut state = self.state.lock().await;
            let delivery = state
                .deliveries
                .get_mut(&id)
                .ok_or_else(|| CheckoutError::NotFound(format!("delivery {id}")))?;
            delivery.status = status;
            Ok(delivery.clone())
        }

        async fn remove_on_the_way(&self, id: i64) -> Result<bool> {
            let mut state = self.state.lock().await;
            match state.deliveries.get(&id) {
                Some(d) if d.status == DeliveryStatus::OnTheWay => {
                    state.deliveries.remove(&id);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }
}
